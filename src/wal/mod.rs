//! Write-Ahead Log for filesystem operations the commit stage performs.
//!
//! Every mkdir and move/copy the commit stage applies is logged as a
//! journal entry with a precomputed inverse before it runs, so a crash
//! mid-commit leaves a durable record `wal::recovery` can resume or roll
//! back on the next startup.

pub mod entry;
pub mod journal;
pub mod recovery;

pub use entry::{WALEntry, WALJournal, WALOperationType, WALStatus};
pub use journal::{WALError, WALErrorKind, WALManager};
pub use recovery::{check_for_recovery, discard_journal, get_journal_details, resume_journal, rollback_journal, RecoveryInfo, RecoveryResult};
