pub mod backend;

use crate::model::{SectionKey, Value};
use backend::ProgressBackend;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::PersistenceError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(3_000);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SectionRecord {
    pub unit_id: String,
    pub lesson_id: String,
    pub section_id: String,
    pub state: Value,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl SectionRecord {
    fn key(&self) -> SectionKey {
        SectionKey::new(&self.unit_id, &self.lesson_id, &self.section_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub completed: bool,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    first: Instant,
    due: Instant,
}

pub struct ProgressStore<B: ProgressBackend> {
    backend: B,
    // None = ya consultado y no hay nada guardado.
    records: HashMap<SectionKey, Option<SectionRecord>>,
    pending: HashMap<SectionKey, PendingWrite>,
    debounce: Duration,
    max_wait: Duration,
}

impl<B: ProgressBackend> ProgressStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            records: HashMap::new(),
            pending: HashMap::new(),
            debounce: DEFAULT_DEBOUNCE,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// `debounce`: silencio necesario antes de escribir; `max_wait`: tope
    /// desde la primera escritura pendiente aunque sigan llegando cambios.
    pub fn with_timing(mut self, debounce: Duration, max_wait: Duration) -> Self {
        self.debounce = debounce;
        self.max_wait = max_wait.max(debounce);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Registro actual de la sección, cargándolo si hace falta. Un registro
    /// ilegible o un almacenamiento caído cuentan como "sin registro".
    pub fn record(&mut self, key: &SectionKey) -> Option<&SectionRecord> {
        if !self.records.contains_key(key) {
            let loaded = self.load(key);
            self.records.insert(key.clone(), loaded);
        }
        self.records.get(key).and_then(Option::as_ref)
    }

    fn load(&mut self, key: &SectionKey) -> Option<SectionRecord> {
        let raw = match self.backend.load(&key.storage_key()) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("progreso de {} no disponible: {err}", key.storage_key());
                return None;
            }
        };
        match serde_json::from_str::<SectionRecord>(&raw) {
            Ok(record) if record.key() == *key => Some(record),
            Ok(_) => {
                warn!("registro de {} con clave cruzada; se ignora", key.storage_key());
                None
            }
            Err(err) => {
                warn!("registro de {} corrupto: {err}", key.storage_key());
                None
            }
        }
    }

    pub fn is_completed(&mut self, key: &SectionKey) -> bool {
        self.record(key).is_some_and(|r| r.completed)
    }

    /// Guarda el estado en memoria al instante y programa la escritura
    /// duradera. Escribir el mismo estado dos veces no cambia nada.
    pub fn put(
        &mut self,
        key: &SectionKey,
        state: Value,
        completed: bool,
        now: Instant,
    ) -> WriteOutcome {
        if let Some(current) = self.record(key) {
            if current.state == state && current.completed == completed {
                return WriteOutcome {
                    completed,
                    changed: false,
                };
            }
        }

        let record = SectionRecord {
            unit_id: key.unit_id.clone(),
            lesson_id: key.lesson_id.clone(),
            section_id: key.section_id.clone(),
            state,
            completed,
            updated_at: Utc::now(),
        };
        self.records.insert(key.clone(), Some(record));

        let first = self.pending.get(key).map(|p| p.first).unwrap_or(now);
        let due = (now + self.debounce).min(first + self.max_wait);
        self.pending.insert(key.clone(), PendingWrite { first, due });

        WriteOutcome {
            completed,
            changed: true,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.due).min()
    }

    /// Escribe las secciones cuyo plazo venció. Devuelve cuántas se guardaron.
    pub fn tick(&mut self, now: Instant) -> Result<usize, PersistenceError> {
        let due: Vec<SectionKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(k, _)| k.clone())
            .collect();
        self.write_through(due)
    }

    pub fn flush_all(&mut self) -> Result<usize, PersistenceError> {
        let keys: Vec<SectionKey> = self.pending.keys().cloned().collect();
        self.write_through(keys)
    }

    fn write_through(&mut self, keys: Vec<SectionKey>) -> Result<usize, PersistenceError> {
        if keys.is_empty() {
            return Ok(0);
        }
        for key in &keys {
            let Some(Some(record)) = self.records.get(key) else {
                self.pending.remove(key);
                continue;
            };
            let json = serde_json::to_string(record)?;
            // Si falla, la escritura sigue pendiente y se reintenta en el próximo tick.
            self.backend.store(&key.storage_key(), json)?;
        }
        self.backend.flush()?;
        for key in &keys {
            self.pending.remove(key);
        }
        debug!("progreso: {} secciones escritas", keys.len());
        Ok(keys.len())
    }
}

/// Vista tipada de una sección con su estado por defecto y su predicado de
/// completitud.
pub struct SectionTracker<S> {
    key: SectionKey,
    default: S,
    check: Box<dyn Fn(&S) -> bool>,
}

impl<S> SectionTracker<S>
where
    S: Serialize + DeserializeOwned + Clone,
{
    pub fn new(key: SectionKey, default: S, check: impl Fn(&S) -> bool + 'static) -> Self {
        Self {
            key,
            default,
            check: Box::new(check),
        }
    }

    pub fn key(&self) -> &SectionKey {
        &self.key
    }

    pub fn default_state(&self) -> &S {
        &self.default
    }

    pub fn check(&self, state: &S) -> bool {
        (self.check)(state)
    }

    /// Estado guardado, o el estado por defecto si no hay o no se puede leer.
    pub fn read<B: ProgressBackend>(&self, store: &mut ProgressStore<B>) -> S {
        let Some(record) = store.record(&self.key) else {
            return self.default.clone();
        };
        match serde_json::from_value::<S>(record.state.clone()) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    "estado de {} ilegible ({err}); se usa el estado inicial",
                    self.key.storage_key()
                );
                self.default.clone()
            }
        }
    }

    pub fn write<B: ProgressBackend>(
        &self,
        store: &mut ProgressStore<B>,
        state: &S,
        now: Instant,
    ) -> WriteOutcome {
        let completed = self.check(state);
        match serde_json::to_value(state) {
            Ok(value) => store.put(&self.key, value, completed, now),
            Err(err) => {
                warn!("no se pudo serializar {}: {err}", self.key.storage_key());
                WriteOutcome {
                    completed,
                    changed: false,
                }
            }
        }
    }

    /// Sobrescribe con el estado inicial; los registros nunca se borran.
    pub fn reset<B: ProgressBackend>(
        &self,
        store: &mut ProgressStore<B>,
        now: Instant,
    ) -> WriteOutcome {
        let default = self.default.clone();
        self.write(store, &default, now)
    }

    pub fn is_completed<B: ProgressBackend>(&self, store: &mut ProgressStore<B>) -> bool {
        store.is_completed(&self.key)
    }
}
