//! Parse a gitconfig from an inherited fd and answer field requests.
//!
//! The parent first sends `GitconfigParseRequest` with the config file's
//! fd, then any number of int/str/extensions requests; the extensions
//! reply is a count followed by that many strings.

use std::fs::File;
use std::io::Read;

use grit_config::ConfigFile;
use grit_ipc::{sigint, Bus, ConfigField, IpcError, Message};
use grit_workers::{exit_with, setup};

fn main() {
    let mut bus = match setup() {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("{}: {e}", grit_workers::progname());
            std::process::exit(1);
        }
    };
    let result = serve(&mut bus);
    exit_with(&mut bus, result);
}

fn serve(bus: &mut Bus) -> anyhow::Result<()> {
    let mut config: Option<ConfigFile> = None;

    loop {
        if sigint::sigint_received() {
            return Err(IpcError::Cancelled.into());
        }

        let (msg, fd) = match bus.recv() {
            Ok(received) => received,
            Err(IpcError::PrivsepPipe) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match msg {
            Message::Stop => return Ok(()),
            Message::GitconfigParseRequest => {
                let mut file = File::from(fd.ok_or(IpcError::PrivsepNoFd)?);
                let mut text = String::new();
                file.read_to_string(&mut text)?;
                config = Some(ConfigFile::parse(&text)?);
            }
            Message::GitconfigIntRequest(field) => {
                let cfg = config.as_ref().ok_or(IpcError::PrivsepMsg)?;
                let value = match field {
                    ConfigField::RepositoryFormatVersion => cfg
                        .get_int("core", "repositoryformatversion")?
                        .unwrap_or(0),
                    _ => return Err(IpcError::PrivsepMsg.into()),
                };
                bus.send(&Message::GitconfigInt(value))?;
            }
            Message::GitconfigStrRequest(field) => {
                let cfg = config.as_ref().ok_or(IpcError::PrivsepMsg)?;
                let value = match field {
                    ConfigField::AuthorName => cfg.get("user", "name"),
                    ConfigField::AuthorEmail => cfg.get("user", "email"),
                    ConfigField::Owner => cfg
                        .get("core", "owner")
                        .or_else(|| cfg.get("gitweb", "owner")),
                    ConfigField::RepositoryFormatVersion => {
                        return Err(IpcError::PrivsepMsg.into())
                    }
                };
                bus.send(&Message::GitconfigStr(value.map(str::to_string)))?;
            }
            Message::GitconfigExtensionsRequest => {
                let cfg = config.as_ref().ok_or(IpcError::PrivsepMsg)?;
                let extensions: Vec<String> = cfg
                    .get_section("extensions")
                    .iter()
                    .map(|entry| entry.name.clone())
                    .collect();
                bus.send(&Message::GitconfigInt(extensions.len() as i64))?;
                for ext in extensions {
                    bus.send(&Message::GitconfigStr(Some(ext)))?;
                }
            }
            _ => return Err(IpcError::PrivsepMsg.into()),
        }
    }
}
