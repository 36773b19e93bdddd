//! The inspection session store.
//!
//! `Session` is plain owned state; every mutation goes through one of the
//! named transitions below. It performs no I/O itself: transitions that
//! need a file read or a parse call hand back a [`PendingRead`] or
//! [`ParseRequest`], and the caller reports the result later through
//! [`Session::complete_read`] / [`Session::finish_parse`].

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CollaboratorError, ParseFailure, ReadError, SessionError};
use crate::intake::{
    EntryId, EntryStatus, FileEntry, FileSource, Payload, PendingRead, settled_status,
};
use crate::password::{PasswordPhase, PasswordSession};
use crate::tree::{self, TreeLine, TreeViewState};
use crate::validate::{self, CertificateBundle};

const NOTICE_LIMIT: usize = 32;

/// Identifies one dispatched parse. Only the ticket the session is
/// currently waiting on may apply its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseTicket {
    pub entry: EntryId,
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub ticket: ParseTicket,
    pub name: String,
    pub payload: Payload,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    Applied,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

/// Read-only view published to the presentation layer.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub entries: Vec<FileEntry>,
    pub selected: Option<EntryId>,
    pub password: PasswordSession,
    pub prompt_open: bool,
    pub processing: bool,
    pub bundle: Option<Arc<CertificateBundle>>,
    pub notices: Vec<Notice>,
}

impl Snapshot {
    /// No read or parse is outstanding.
    pub fn is_settled(&self) -> bool {
        !self.processing
            && self
                .entries
                .iter()
                .all(|e| e.payload.is_some() || e.status == EntryStatus::Errored)
    }

    pub fn entry(&self, id: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    entries: Vec<FileEntry>,
    selected: Option<EntryId>,
    password: PasswordSession,
    bundle: Option<Arc<CertificateBundle>>,
    tree: TreeViewState,
    inflight: Option<ParseTicket>,
    next_seq: u64,
    notices: VecDeque<Notice>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn password(&self) -> &PasswordSession {
        &self.password
    }

    pub fn bundle(&self) -> Option<&Arc<CertificateBundle>> {
        self.bundle.as_ref()
    }

    pub fn tree_state(&self) -> &TreeViewState {
        &self.tree
    }

    pub fn processing(&self) -> bool {
        self.inflight.is_some()
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    /// Registers a batch of files. Each returned read must be performed and
    /// reported back through [`Session::complete_read`].
    pub fn submit_batch(&mut self, sources: Vec<FileSource>) -> Vec<PendingRead> {
        sources
            .into_iter()
            .enumerate()
            .map(|(batch_index, source)| {
                let id = nanoid::nanoid!(12);
                let entry = FileEntry::new(id.clone(), &source.name());
                info!(
                    entry_id = %id,
                    filename = %entry.name,
                    status = ?entry.status,
                    "File submitted"
                );
                let pending = PendingRead {
                    id,
                    batch_index,
                    encoding: entry.encoding,
                    source,
                };
                self.entries.push(entry);
                pending
            })
            .collect()
    }

    /// Applies one read completion. Returns the parse to dispatch when the
    /// completion auto-selected a plaintext entry.
    ///
    /// Auto-selection follows completion order: the first file of a batch or
    /// any encrypted file is selected when its read finishes, so with several
    /// files in flight the final selection depends on which read lands last.
    pub fn complete_read(
        &mut self,
        id: &str,
        batch_index: usize,
        result: Result<Payload, ReadError>,
    ) -> Option<ParseRequest> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            debug!(entry_id = %id, "Read finished for removed entry");
            return None;
        };

        match result {
            Ok(payload) => {
                entry.status = settled_status(&entry.extension, &payload);
                entry.payload = Some(payload);
                entry.error = None;
                info!(entry_id = %id, filename = %entry.name, status = ?entry.status, "File read");

                if batch_index == 0 || entry.status == EntryStatus::Encrypted {
                    return self.select(id).ok().flatten();
                }
                None
            }
            Err(err) => {
                let message = err.to_string();
                entry.status = EntryStatus::Errored;
                entry.error = Some(message.clone());
                let title = format!("could not read {}", entry.name);
                warn!(entry_id = %id, filename = %entry.name, error = %message, "File read failed");
                self.notify(NoticeLevel::Destructive, &title, &message);
                None
            }
        }
    }

    /// Makes `id` the current selection and re-arms the password gate.
    /// Plaintext entries dispatch a parse right away; encrypted ones wait
    /// for a secret.
    pub fn select(&mut self, id: &str) -> Result<Option<ParseRequest>, SessionError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| SessionError::UnknownEntry(id.to_string()))?;
        if entry.payload.is_none() {
            return Err(SessionError::NotReadable(id.to_string()));
        }
        let needs_password = entry.shows_encryption();

        self.selected = Some(id.to_string());
        self.inflight = None;
        self.set_bundle(None);
        self.password.arm(needs_password);
        info!(entry_id = %id, needs_password, "Entry selected");

        if needs_password {
            return Ok(None);
        }
        self.dispatch(None).map(Some)
    }

    pub fn remove(&mut self, id: &str) -> Result<(), SessionError> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| SessionError::UnknownEntry(id.to_string()))?;
        let entry = self.entries.remove(position);
        info!(entry_id = %id, filename = %entry.name, "Entry removed");

        if self.selected.as_deref() == Some(id) {
            self.clear_selection();
        }
        Ok(())
    }

    /// Drops every entry and all dependent state.
    pub fn reset(&mut self) {
        let next_seq = self.next_seq;
        *self = Self {
            next_seq,
            ..Self::default()
        };
        info!("Session reset");
    }

    pub fn submit_password(&mut self, secret: &str) -> Result<ParseRequest, SessionError> {
        self.selected_payload()?;
        self.password.submit(secret)?;
        self.dispatch(Some(secret.to_string()))
    }

    pub fn skip_password(&mut self) -> Result<(), SessionError> {
        self.password.skip()?;
        info!(entry_id = ?self.selected, "Password prompt skipped");
        Ok(())
    }

    pub fn retry_password(&mut self) -> Result<(), SessionError> {
        self.password.retry()?;
        Ok(())
    }

    /// Applies a parse result if `ticket` is still the one in flight.
    pub fn finish_parse(
        &mut self,
        ticket: &ParseTicket,
        result: Result<Value, CollaboratorError>,
    ) -> ParseOutcome {
        if self.inflight.as_ref() != Some(ticket) {
            debug!(entry_id = %ticket.entry, seq = ticket.seq, "Discarding stale parse response");
            return ParseOutcome::Stale;
        }
        self.inflight = None;

        let message = match result {
            Ok(value) => match validate::validate(value) {
                Ok(bundle) => {
                    if self.password.resolve().is_ok() {
                        info!(entry_id = %ticket.entry, "Password accepted");
                    }
                    info!(entry_id = %ticket.entry, certificates = bundle.len(), "Bundle loaded");
                    self.set_bundle(Some(Arc::new(bundle)));
                    return ParseOutcome::Applied;
                }
                Err(err) => {
                    warn!(
                        entry_id = %ticket.entry,
                        path = %err.path(),
                        "Parse response failed validation"
                    );
                    format!("invalid certificate data: {err}")
                }
            },
            Err(err) => {
                warn!(entry_id = %ticket.entry, error = %err, "Parse failed");
                err.user_message()
            }
        };

        self.set_bundle(None);
        let carried_secret = self.password.phase() == PasswordPhase::Verifying;
        match ParseFailure::classify(carried_secret, message) {
            ParseFailure::PasswordRejected(message) => {
                info!(
                    entry_id = %ticket.entry,
                    attempts = self.password.attempt_count(),
                    "Password rejected"
                );
                if let Err(err) = self.password.fail(message) {
                    warn!(entry_id = %ticket.entry, error = %err, "Password state out of step");
                }
            }
            ParseFailure::Unparsed(message) => {
                self.notify(NoticeLevel::Destructive, "certificate parsing failed", &message);
            }
        }
        ParseOutcome::Applied
    }

    /// Flips the collapsed flag of one path in the current bundle's view.
    pub fn toggle(&mut self, path: &str) -> Result<bool, SessionError> {
        if self.bundle.is_none() {
            return Err(SessionError::NoBundle);
        }
        Ok(self.tree.toggle(path))
    }

    /// Sets the collapsed flag of one path, whatever it was before.
    pub fn set_collapsed(&mut self, path: &str, collapsed: bool) -> Result<(), SessionError> {
        if self.bundle.is_none() {
            return Err(SessionError::NoBundle);
        }
        if collapsed {
            self.tree.collapse(path);
        } else {
            self.tree.expand(path);
        }
        Ok(())
    }

    pub fn tree_lines(&self) -> Vec<TreeLine> {
        self.bundle
            .as_ref()
            .map(|bundle| tree::lines(bundle.as_value(), &self.tree).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.clone(),
            selected: self.selected.clone(),
            password: self.password.clone(),
            prompt_open: self.password.prompt_visible(),
            processing: self.processing(),
            bundle: self.bundle.clone(),
            notices: self.notices.iter().cloned().collect(),
        }
    }

    fn selected_payload(&self) -> Result<(&FileEntry, &Payload), SessionError> {
        let id = self.selected.as_deref().ok_or(SessionError::NothingSelected)?;
        let entry = self
            .entry(id)
            .ok_or_else(|| SessionError::UnknownEntry(id.to_string()))?;
        let payload = entry
            .payload
            .as_ref()
            .ok_or_else(|| SessionError::NotReadable(id.to_string()))?;
        Ok((entry, payload))
    }

    fn dispatch(&mut self, secret: Option<String>) -> Result<ParseRequest, SessionError> {
        let (entry, payload) = self.selected_payload()?;
        let name = entry.name.clone();
        let payload = payload.clone();
        let entry_id = entry.id.clone();

        self.next_seq += 1;
        let ticket = ParseTicket {
            entry: entry_id,
            seq: self.next_seq,
        };
        self.inflight = Some(ticket.clone());
        Ok(ParseRequest {
            ticket,
            name,
            payload,
            secret,
        })
    }

    fn clear_selection(&mut self) {
        self.selected = None;
        self.inflight = None;
        self.password.reset();
        self.set_bundle(None);
    }

    /// Any change of bundle starts a fresh tree view.
    fn set_bundle(&mut self, bundle: Option<Arc<CertificateBundle>>) {
        self.tree.clear();
        self.bundle = bundle;
    }

    fn notify(&mut self, level: NoticeLevel, title: &str, message: &str) {
        if self.notices.len() == NOTICE_LIMIT {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
