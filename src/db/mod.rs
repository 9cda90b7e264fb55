//! Flat-file database.
//!
//! The whole state is kept in one line-oriented text file. Saving renders
//! every row into memory, writes it to a temporary file next to the target
//! and renames it over the old file, so a crash mid-save never leaves a
//! truncated database behind. Loading streams rows through the
//! [`HandlerTable`].

mod handlers;
pub mod row;
mod writer;

pub use handlers::{CURRENT_DBV, HandlerTable, LoadContext, RowHandler, Trailer};
pub use row::{RowError, RowReader, RowWriter};
pub use writer::render;

use crate::config::DatabaseConfig;
use crate::state::ServiceState;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database schema version {found} is newer than supported version {supported}")]
    NewerVersion { found: u32, supported: u32 },

    #[error("line {line}: malformed {tag} row: {source}")]
    Malformed {
        line: usize,
        tag: String,
        #[source]
        source: RowError,
    },

    #[error("line {line}: unknown row type {tag}")]
    UnknownRow { line: usize, tag: String },

    #[error("line {line}: data before the DBV row")]
    MissingVersion { line: usize },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode database: {0}")]
    Encode(#[from] RowError),
}

impl DbError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "db_io",
            Self::NewerVersion { .. } => "db_newer_version",
            Self::Malformed { .. } => "db_malformed",
            Self::UnknownRow { .. } => "db_unknown_row",
            Self::MissingVersion { .. } => "db_missing_version",
            Self::Rename { .. } => "db_rename",
            Self::Encode(_) => "db_encode",
        }
    }
}

/// Statistics of one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Schema version of the file. Zero if the file did not exist.
    pub dbv: u32,
    /// Rows applied.
    pub rows: usize,
    /// Rows rejected by their handler.
    pub skipped: usize,
    /// Rows with an unknown tag.
    pub unknown: usize,
    pub accounts: usize,
    pub groups: usize,
    pub channels: usize,
    pub chanacs: usize,
}

/// Handle to the database file.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    temp_path: PathBuf,
    strict: bool,
    handlers: HandlerTable,
}

impl Database {
    /// `strict` turns unknown and malformed rows into load failures.
    pub fn new(path: impl Into<PathBuf>, temp_suffix: &str, strict: bool) -> Self {
        let path = path.into();
        let mut temp = path.clone().into_os_string();
        temp.push(temp_suffix);
        Self {
            path,
            temp_path: PathBuf::from(temp),
            strict,
            handlers: HandlerTable::standard(),
        }
    }

    pub fn from_config(config: &DatabaseConfig, strict: bool) -> Self {
        Self::new(&config.path, &config.temp_suffix, strict)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerTable {
        &mut self.handlers
    }

    /// Load the database file into `state`. A missing file is an empty
    /// database.
    pub fn load(&self, state: &mut ServiceState) -> Result<LoadReport, DbError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No database found, starting empty");
                return Ok(LoadReport::default());
            }
            Err(e) => return Err(e.into()),
        };
        let report = self.load_str(state, &text)?;
        info!(
            path = %self.path.display(),
            dbv = report.dbv,
            accounts = report.accounts,
            groups = report.groups,
            channels = report.channels,
            chanacs = report.chanacs,
            skipped = report.skipped,
            unknown = report.unknown,
            "Database loaded"
        );
        Ok(report)
    }

    /// Load database text into `state`.
    pub fn load_str(&self, state: &mut ServiceState, text: &str) -> Result<LoadReport, DbError> {
        let mut ctx = LoadContext::new(state);
        let mut seen_version = false;

        for (idx, raw) in text.split('\n').enumerate() {
            let line = idx + 1;
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            if raw.starts_with('#') {
                continue;
            }
            let Some(mut row) = RowReader::new(raw) else {
                continue;
            };
            let tag = row.tag();
            ctx.line = line;

            if tag == "DBV" {
                let dbv = row.read_u32("version").map_err(|source| DbError::Malformed {
                    line,
                    tag: tag.to_string(),
                    source,
                })?;
                if dbv > CURRENT_DBV {
                    return Err(DbError::NewerVersion {
                        found: dbv,
                        supported: CURRENT_DBV,
                    });
                }
                if dbv < CURRENT_DBV {
                    warn!(dbv, current = CURRENT_DBV, "Upgrading database from older schema");
                }
                ctx.dbv = dbv;
                ctx.report.dbv = dbv;
                ctx.report.rows += 1;
                seen_version = true;
                continue;
            }
            if !seen_version {
                return Err(DbError::MissingVersion { line });
            }

            let Some(handler) = self.handlers.get(tag) else {
                if self.strict {
                    return Err(DbError::UnknownRow {
                        line,
                        tag: tag.to_string(),
                    });
                }
                warn!(line, tag, "Unknown row type skipped");
                ctx.report.unknown += 1;
                continue;
            };

            match handler(&mut ctx, &mut row) {
                Ok(()) => ctx.report.rows += 1,
                Err(source) if self.strict => {
                    return Err(DbError::Malformed {
                        line,
                        tag: tag.to_string(),
                        source,
                    });
                }
                Err(source) => {
                    warn!(line, tag, error = %source, "Row skipped");
                    ctx.report.skipped += 1;
                }
            }
        }

        if ctx.dbv < 8 {
            restore_founders(ctx.state);
        }
        check_trailer(&ctx);
        Ok(ctx.report)
    }

    /// Render and write `state`. Returns the number of bytes written.
    pub fn save(&self, state: &ServiceState) -> Result<usize, DbError> {
        let text = render(state)?;
        self.write(&text)?;
        Ok(text.len())
    }

    /// Atomically replace the database file with `contents`.
    pub fn write(&self, contents: &str) -> Result<(), DbError> {
        if let Err(e) = self.write_temp(contents) {
            let _ = fs::remove_file(&self.temp_path);
            return Err(e.into());
        }
        fs::rename(&self.temp_path, &self.path).map_err(|source| DbError::Rename {
            from: self.temp_path.clone(),
            to: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), bytes = contents.len(), "Database written");
        Ok(())
    }

    fn write_temp(&self, contents: &str) -> std::io::Result<()> {
        let file = File::create(&self.temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// Old schemas did not store the founder; take the first entity holding
/// the founder flag.
fn restore_founders(state: &mut ServiceState) {
    let founder = state.flags.founder();
    for cid in state.channels.ids() {
        let Some(chan) = state.channels.get_mut(cid) else {
            continue;
        };
        if chan.founder.is_some() {
            continue;
        }
        chan.founder = chan
            .access
            .entities()
            .find(|(_, e)| e.level & founder != 0)
            .map(|(id, _)| id);
        if chan.founder.is_none() {
            warn!(channel = %chan.name, "Channel has no founder");
        }
    }
}

fn check_trailer(ctx: &LoadContext<'_>) {
    let Some(trailer) = ctx.trailer else {
        if ctx.report.rows > 0 {
            warn!("Database has no end marker, it may be truncated");
        }
        return;
    };
    let r = &ctx.report;
    let groups_ok = trailer.groups.is_none_or(|g| g == r.groups as u64);
    if trailer.accounts != r.accounts as u64
        || trailer.channels != r.channels as u64
        || trailer.chanacs != r.chanacs as u64
        || !groups_ok
    {
        error!(
            expected = ?trailer,
            accounts = r.accounts,
            channels = r.channels,
            chanacs = r.chanacs,
            groups = r.groups,
            "Database object counts do not match the end marker"
        );
    }
}
