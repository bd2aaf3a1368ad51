//! Lookup sequences against a contact repository

use anyhow::{bail, Context, Result};
use contactcache::ContactRepository;
use contactdb::Contact;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// How a batch of lookups is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One after another on the calling thread
    Sequential,
    /// All at once, one scoped thread per lookup
    Parallel,
}

pub struct Runner<'a> {
    repo: &'a ContactRepository,
    json: bool,
    running: Arc<AtomicBool>,
}

impl<'a> Runner<'a> {
    /// `running` is cleared on Ctrl-C; lookups not yet started are skipped
    pub fn new(repo: &'a ContactRepository, json: bool, running: Arc<AtomicBool>) -> Self {
        Self {
            repo,
            json,
            running,
        }
    }

    /// Look up every id, logging each contact as it is returned
    ///
    /// Sequential runs stop at the first failed lookup. Parallel runs
    /// report every failure and then fail as a whole.
    pub fn run(&self, ids: &[i64], mode: Mode) -> Result<Vec<Contact>> {
        match mode {
            Mode::Sequential => ids.iter().map(|&id| self.lookup(id)).collect(),
            Mode::Parallel => self.run_parallel(ids),
        }
    }

    fn run_parallel(&self, ids: &[i64]) -> Result<Vec<Contact>> {
        let results: Vec<Result<Contact>> = thread::scope(|s| {
            let handles: Vec<_> = ids
                .iter()
                .map(|&id| s.spawn(move || self.lookup(id)))
                .collect();

            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("lookup thread panicked")),
                })
                .collect()
        });

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            bail!("{} of {} lookups failed", failed, ids.len());
        }
        results.into_iter().collect()
    }

    fn lookup(&self, id: i64) -> Result<Contact> {
        if !self.running.load(Ordering::SeqCst) {
            bail!("lookup of contact {} skipped, run was stopped", id);
        }

        let contact = match self.repo.get_by_id(id) {
            Ok(contact) => contact,
            Err(e) => {
                error!(id, error = %e, "contact lookup failed");
                return Err(e).with_context(|| format!("lookup of contact {} failed", id));
            }
        };

        info!("{}", lookup_line(id, &contact));
        if self.json {
            println!("{}", json_line(&contact)?);
        }

        Ok(contact)
    }
}

/// `contact <id> => <contact>`
pub fn lookup_line(id: i64, contact: &Contact) -> String {
    format!("contact {} => {}", id, contact)
}

/// One JSON object per contact, no trailing newline
pub fn json_line(contact: &Contact) -> Result<String> {
    serde_json::to_string(contact).context("Failed to encode contact")
}
