use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::domain::invoice::{Amount, InvoiceError, InvoiceNumber, InvoiceRequest};

/// Sessions idle for longer than this are forgotten.
const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Submission parameters compared to detect an accidental repeat.
///
/// The invoice number is not part of the key: it is only known once the
/// submission has been numbered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionKey {
  client_id: String,
  product_id: String,
  quantity: u32,
  manual_amount: Option<Amount>,
  notes: Option<String>,
}

impl SubmissionKey {
  /// The manual amount only counts for variable-amount products; fixed-price
  /// products ignore it when totals are computed.
  pub fn new(request: &InvoiceRequest, variable_amount: bool) -> Self {
    Self {
      client_id: request.client_id.trim().to_string(),
      product_id: request.product_id.trim().to_string(),
      quantity: request.quantity.value(),
      manual_amount: request.manual_amount.filter(|_| variable_amount),
      notes: request.notes.value().map(str::to_string),
    }
  }
}

#[derive(Debug)]
struct SessionState {
  processing: bool,
  last_issued: Option<(SubmissionKey, InvoiceNumber)>,
  last_seen: Instant,
}

impl SessionState {
  fn new() -> Self {
    Self {
      processing: false,
      last_issued: None,
      last_seen: Instant::now(),
    }
  }
}

/// Per-session submission state: one submission in flight at a time, and no
/// identical resubmission of the last issued invoice.
#[derive(Debug, Default)]
pub struct SessionRegistry {
  sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionState>> {
    self
      .sessions
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn acquire(
    self: &Arc<Self>,
    session_id: &str,
    key: SubmissionKey,
  ) -> Result<SubmissionPermit, InvoiceError> {
    let mut sessions = self.lock();
    sessions.retain(|id, state| {
      id == session_id || state.processing || state.last_seen.elapsed() < SESSION_IDLE_LIMIT
    });

    let state = sessions
      .entry(session_id.to_string())
      .or_insert_with(SessionState::new);
    state.last_seen = Instant::now();

    if state.processing {
      return Err(InvoiceError::SubmissionInProgress);
    }
    if let Some((last_key, number)) = &state.last_issued {
      if *last_key == key {
        return Err(InvoiceError::DuplicateSubmission {
          invoice_number: number.to_string(),
        });
      }
    }

    state.processing = true;
    Ok(SubmissionPermit {
      registry: Arc::clone(self),
      session_id: session_id.to_string(),
      key,
    })
  }

  pub fn is_processing(&self, session_id: &str) -> bool {
    self
      .lock()
      .get(session_id)
      .is_some_and(|state| state.processing)
  }
}

/// Held while a submission runs; dropping it releases the session.
#[derive(Debug)]
pub struct SubmissionPermit {
  registry: Arc<SessionRegistry>,
  session_id: String,
  key: SubmissionKey,
}

impl SubmissionPermit {
  /// Remembers the submission as issued under `number`.
  pub fn complete(self, number: &InvoiceNumber) {
    if let Some(state) = self.registry.lock().get_mut(&self.session_id) {
      state.last_issued = Some((self.key.clone(), number.clone()));
    }
  }
}

impl Drop for SubmissionPermit {
  fn drop(&mut self) {
    if let Some(state) = self.registry.lock().get_mut(&self.session_id) {
      state.processing = false;
      state.last_seen = Instant::now();
    }
  }
}
