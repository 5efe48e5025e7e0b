// SPDX-License-Identifier: GPL-3.0-only

//! Disk image attach through `hdiutil(1)`
//!
//! The disk image framework is private and its kernel client is gated by an
//! entitlement only `hdiutil` carries, so images are attached by running the
//! utility and parsing its `-plist` output.

use std::path::{Path, PathBuf};

use arbiter_types::AttachMode;
use plist::Value;
use tracing::{debug, info};

use crate::error::{AttachError, Result};
use crate::process::{CommandRunner, PipedRunner};

pub const DEFAULT_HDIUTIL_PATH: &str = "/usr/bin/hdiutil";

/// Attaches disk images and reports the resulting disk identifiers.
pub trait ImageAttacher: Send + Sync {
    fn attach(
        &self,
        image: &Path,
        mode: AttachMode,
        passphrase: Option<&str>,
    ) -> Result<Vec<String>>;
}

/// Driver for the `hdiutil` binary
#[derive(Debug, Clone)]
pub struct Hdiutil<R = PipedRunner> {
    program: PathBuf,
    runner: R,
}

impl Hdiutil {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_runner(program, PipedRunner)
    }
}

impl Default for Hdiutil {
    fn default() -> Self {
        Self::new(DEFAULT_HDIUTIL_PATH)
    }
}

impl<R: CommandRunner> Hdiutil<R> {
    pub fn with_runner(program: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `hdiutil <verb> <args...> <image>` and return stdout on success.
    fn invoke(&self, verb: &str, image: &Path, args: &[String], stdin: &[u8]) -> Result<Vec<u8>> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        argv.push(verb.to_string());
        argv.extend(args.iter().cloned());
        argv.push(image.to_string_lossy().into_owned());

        self.runner
            .run(&self.program, &argv, stdin)?
            .into_stdout(&self.program)
    }

    /// Whether the image requires a passphrase.
    pub fn is_encrypted(&self, image: &Path) -> Result<bool> {
        let stdout = self.invoke("isencrypted", image, &["-plist".to_string()], b"")?;
        parse_encrypted(&stdout)
    }

    /// Whether the image carries a software license agreement that the
    /// utility will prompt to accept.
    pub fn has_license_agreement(&self, image: &Path, passphrase: Option<&str>) -> Result<bool> {
        let mut args = vec!["-plist".to_string()];
        let mut stdin = Vec::new();
        if let Some(passphrase) = passphrase {
            args.push("-stdinpass".to_string());
            stdin.extend_from_slice(passphrase.as_bytes());
            stdin.push(b'\n');
        }

        let stdout = self.invoke("imageinfo", image, &args, &stdin)?;
        parse_license_agreement(&stdout)
    }
}

impl<R: CommandRunner> ImageAttacher for Hdiutil<R> {
    fn attach(
        &self,
        image: &Path,
        mode: AttachMode,
        passphrase: Option<&str>,
    ) -> Result<Vec<String>> {
        // Empty passphrases are treated as absent
        let passphrase = passphrase.filter(|p| !p.is_empty());

        if self.is_encrypted(image)? && passphrase.is_none() {
            return Err(AttachError::InvalidState(
                "Image is encrypted and a password was not provided".to_string(),
            ));
        }

        let license = self.has_license_agreement(image, passphrase)?;
        if license {
            debug!("{} carries a license agreement, accepting it", image.display());
        }

        let args = build_attach_args(mode, passphrase.is_some());
        let stdin = attach_stdin(passphrase, license);

        let stdout = self.invoke("attach", image, &args, &stdin)?;
        let disks = parse_attached_devices(&stdout)?;

        info!(
            "Attached {} ({mode}) as {}",
            image.display(),
            if disks.is_empty() {
                "<no devices>".to_string()
            } else {
                disks.join(", ")
            }
        );
        Ok(disks)
    }
}

/// Arguments for `hdiutil attach`, excluding the verb and image path.
pub fn build_attach_args(mode: AttachMode, stdin_passphrase: bool) -> Vec<String> {
    let mut args = vec!["-plist".to_string(), "-noverify".to_string()];

    if stdin_passphrase {
        args.push("-stdinpass".to_string());
    }

    match mode {
        AttachMode::None => args.push("-nomount".to_string()),
        AttachMode::ReadOnly => args.push("-readonly".to_string()),
        AttachMode::ReadWrite => {}
    }

    args
}

/// Standard input for `hdiutil attach`: the passphrase line, then the
/// license acceptance line.
pub fn attach_stdin(passphrase: Option<&str>, accept_license: bool) -> Vec<u8> {
    let mut stdin = Vec::new();
    if let Some(passphrase) = passphrase {
        stdin.extend_from_slice(passphrase.as_bytes());
        stdin.push(b'\n');
    }
    if accept_license {
        stdin.extend_from_slice(b"Y\n");
    }
    stdin
}

fn parse_encrypted(stdout: &[u8]) -> Result<bool> {
    let value = Value::from_reader(std::io::Cursor::new(stdout))?;

    value
        .as_dictionary()
        .and_then(|dict| dict.get("encrypted"))
        .and_then(Value::as_boolean)
        .ok_or(AttachError::MissingKey("encrypted"))
}

fn parse_license_agreement(stdout: &[u8]) -> Result<bool> {
    let value = Value::from_reader(std::io::Cursor::new(stdout))?;

    value
        .as_dictionary()
        .and_then(|dict| dict.get("Properties"))
        .and_then(Value::as_dictionary)
        .and_then(|props| props.get("Software License Agreement"))
        .and_then(Value::as_boolean)
        .ok_or(AttachError::MissingKey("Software License Agreement"))
}

fn parse_attached_devices(stdout: &[u8]) -> Result<Vec<String>> {
    let value = Value::from_reader(std::io::Cursor::new(stdout))?;

    let entities = value
        .as_dictionary()
        .and_then(|dict| dict.get("system-entities"))
        .and_then(Value::as_array)
        .ok_or(AttachError::MissingKey("system-entities"))?;

    entities
        .iter()
        .map(|entity| {
            entity
                .as_dictionary()
                .and_then(|e| e.get("dev-entry"))
                .and_then(Value::as_string)
                .map(|entry| entry.strip_prefix("/dev/").unwrap_or(entry).to_string())
                .ok_or(AttachError::MissingKey("dev-entry"))
        })
        .collect()
}
