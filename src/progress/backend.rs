use crate::error::PersistenceError;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait ProgressBackend {
    fn load(&mut self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn store(&mut self, key: &str, value: String) -> Result<(), PersistenceError>;
    /// Hace duraderas las escrituras pendientes.
    fn flush(&mut self) -> Result<(), PersistenceError>;
}

impl<B: ProgressBackend + ?Sized> ProgressBackend for Box<B> {
    fn load(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).load(key)
    }

    fn store(&mut self, key: &str, value: String) -> Result<(), PersistenceError> {
        (**self).store(key, value)
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        (**self).flush()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
    flushes: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl ProgressBackend for MemoryBackend {
    fn load(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, value: String) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        self.flushes += 1;
        Ok(())
    }
}

/// Todo el progreso en un único documento JSON, reescrito de forma atómica
/// (fichero temporal + rename).
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: Option<BTreeMap<String, String>>,
    dirty: bool,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&mut self) -> Result<&mut BTreeMap<String, String>, PersistenceError> {
        if self.entries.is_none() {
            match read_document(&self.path) {
                Ok(entries) => self.entries = Some(entries),
                Err(err) => {
                    if matches!(err, PersistenceError::Corrupt(_)) {
                        // Se aparta el fichero dañado y se empieza de cero.
                        self.entries = Some(BTreeMap::new());
                        let backup = self.path.with_extension("corrupt");
                        if let Err(rename_err) = fs::rename(&self.path, &backup) {
                            warn!(
                                "no se pudo apartar {}: {rename_err}",
                                self.path.display()
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        self.entries
            .as_mut()
            .ok_or_else(|| PersistenceError::Unavailable("progreso no cargado".into()))
    }
}

fn read_document(path: &Path) -> Result<BTreeMap<String, String>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

impl ProgressBackend for FileBackend {
    fn load(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn store(&mut self, key: &str, value: String) -> Result<(), PersistenceError> {
        match self.entries() {
            Ok(_) => {}
            // El documento dañado ya se apartó; seguimos sobre uno vacío.
            Err(PersistenceError::Corrupt(_)) => {}
            Err(err) => return Err(err),
        }
        self.entries()?.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }
        let Some(entries) = self.entries.as_ref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!("progreso guardado en {}", self.path.display());
        Ok(())
    }
}

/// Adaptador sobre el almacenamiento persistente de una app eframe.
pub struct EframeBackend<'a> {
    storage: &'a mut dyn eframe::Storage,
}

impl<'a> EframeBackend<'a> {
    pub fn new(storage: &'a mut dyn eframe::Storage) -> Self {
        Self { storage }
    }
}

impl ProgressBackend for EframeBackend<'_> {
    fn load(&mut self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.storage.get_string(key))
    }

    fn store(&mut self, key: &str, value: String) -> Result<(), PersistenceError> {
        self.storage.set_string(key, value);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        self.storage.flush();
        Ok(())
    }
}
