//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Session log files.
//!
//! Log filenames are strftime templates expanded at open time, so a
//! template like `~/logs/%Y-%m-%d-mud.log` rolls naturally when the file
//! is reopened on SIGHUP. Session boundaries are marked with banner
//! lines; the file is fsynced on close.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

/// Timestamp format used in the open/close banners.
const BANNER_TS: &str = "%Y-%m-%d %H:%M:%S %z %Z";

/// An open session log.
#[derive(Debug)]
pub struct LogFile {
    file: File,
    path: PathBuf,
}

impl LogFile {
    /// Expands the template against the current wall clock and opens the
    /// file for append (creating it if needed), writing the `opened`
    /// banner.
    pub fn open(template: &str) -> io::Result<LogFile> {
        let now = Local::now();
        let path = expand_home(&expand_template(template, &now)?);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(
            file,
            "--------------- opened - {} ---------------",
            now.format(BANNER_TS)
        )?;
        Ok(LogFile { file, path })
    }

    /// Appends decoded session bytes.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    /// Writes the `closed` banner, fsyncs, and closes the file.
    pub fn close(mut self) -> io::Result<()> {
        writeln!(
            self.file,
            "--------------- closed - {} ---------------",
            Local::now().format(BANNER_TS)
        )?;
        self.file.sync_all()
    }

    /// Path the log was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Opens the raw-byte companion log (`<expanded template>.raw`), bannerless
/// so the bytes stay verbatim.
pub fn open_raw(template: &str) -> io::Result<File> {
    let now = Local::now();
    let path = expand_home(&format!("{}.raw", expand_template(template, &now)?));
    OpenOptions::new().create(true).append(true).open(path)
}

/// Validates a filename template without touching the filesystem.
pub fn check_template(template: &str) -> io::Result<()> {
    expand_template(template, &Local::now()).map(|_| ())
}

/// Expands a strftime template, rejecting unknown format specifiers
/// instead of panicking inside the formatter.
fn expand_template(template: &str, now: &DateTime<Local>) -> io::Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid log filename template {template:?}"),
        ));
    }
    Ok(now.format_with_items(items.into_iter()).to_string())
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_template(tag: &str) -> String {
        let dir = std::env::temp_dir().join(format!(
            "mudmux-logfile-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("%Y-%m-%d-test.log").to_string_lossy().into_owned()
    }

    #[test]
    fn open_and_close_write_banners() {
        let template = temp_template("banners");
        let mut log = LogFile::open(&template).unwrap();
        log.write(b"You are standing in an open field.\n").unwrap();
        let path = log.path().to_path_buf();
        log.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with("--------------- opened - "));
        assert!(first.ends_with("---------------"));
        assert_eq!(
            lines.next().unwrap(),
            "You are standing in an open field."
        );
        assert!(lines.next().unwrap().starts_with("--------------- closed - "));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn reopening_appends_to_the_same_expanded_name() {
        let template = temp_template("append");
        let log = LogFile::open(&template).unwrap();
        let path = log.path().to_path_buf();
        log.close().unwrap();

        let log = LogFile::open(&template).unwrap();
        assert_eq!(log.path(), path);
        log.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents
                .lines()
                .filter(|l| l.starts_with("--------------- opened"))
                .count(),
            2
        );
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn template_expansion_substitutes_the_date() {
        let now = Local::now();
        let expanded = expand_template("%Y-%m-%d-mud.log", &now).unwrap();
        assert_eq!(expanded, format!("{}-mud.log", now.format("%Y-%m-%d")));
    }

    #[test]
    fn invalid_template_is_rejected() {
        assert!(check_template("%Q-mud.log").is_err());
        assert!(check_template("plain-name.log").is_ok());
    }

    #[test]
    fn raw_log_name_gets_the_raw_suffix() {
        let template = temp_template("raw");
        let file = open_raw(&template).unwrap();
        drop(file);
        let now = Local::now();
        let expected = format!("{}.raw", expand_template(&template, &now).unwrap());
        assert!(std::path::Path::new(&expected).exists());
        std::fs::remove_file(expected).unwrap();
    }
}
