//! Person identity: the key both loan ownership and debt aggregation hang off.
//!
//! Historical rows do not always carry a person id. Resolution prefers the
//! explicit id, then a display-name lookup against the directory, and
//! finally a deterministic synthetic key derived from the normalized name,
//! so unattributed records aggregate consistently instead of being dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::LedgerError;
use crate::store::lock::LockRegistry;
use crate::store::{Record, TabularStore};
use crate::LedgerResult;

/// Prefix distinguishing synthetic name-derived ids from real ones.
const SYNTHETIC_PREFIX: &str = "name:";

/// Mutation scope shared with the debt/netting subsystem.
pub const EXPENSES_LOCK: &str = "expenses";

// ---------------------------------------------------------------------------
// References and normalization
// ---------------------------------------------------------------------------

/// A reference to a person: an explicit identifier, or a deterministic
/// fallback derived from a normalized display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonRef {
    Known(String),
    SyntheticName(String),
}

impl PersonRef {
    /// Canonical id used as the aggregation key. Synthetic refs render with
    /// a `name:` prefix so they can never collide with stored ids.
    pub fn canonical_id(&self) -> String {
        match self {
            PersonRef::Known(id) => id.clone(),
            PersonRef::SyntheticName(key) => format!("{SYNTHETIC_PREFIX}{key}"),
        }
    }

    /// Recover a reference from a canonical id string.
    pub fn from_canonical(id: &str) -> Option<PersonRef> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        match id.strip_prefix(SYNTHETIC_PREFIX) {
            Some(key) => Some(PersonRef::SyntheticName(key.to_string())),
            None => Some(PersonRef::Known(id.to_string())),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, PersonRef::SyntheticName(_))
    }
}

/// Normalize a display name into a stable lookup key: trim, lowercase,
/// fold diacritics, collapse inner whitespace.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match fold_diacritic(c) {
            Some(folded) => out.push(folded),
            None => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// Fold the Latin diacritics that actually occur in household name data.
fn fold_diacritic(c: char) -> Option<char> {
    Some(match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' | 'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Snapshot of the person directory with the name→id map used for fallback
/// resolution. Display names shared by two different ids are ambiguous and
/// excluded from the map: resolving them synthetically is safer than
/// guessing the wrong person.
#[derive(Debug, Default, Clone)]
pub struct PersonDirectory {
    names_by_id: BTreeMap<String, String>,
    id_by_name_key: HashMap<String, String>,
    ambiguous_keys: HashSet<String>,
}

impl PersonDirectory {
    pub fn from_persons<'a>(persons: impl IntoIterator<Item = &'a Person>) -> Self {
        let mut dir = PersonDirectory::default();
        for person in persons {
            let id = person.id.trim();
            let name = person.name.trim();
            if id.is_empty() || name.is_empty() {
                continue;
            }
            dir.names_by_id
                .entry(id.to_string())
                .or_insert_with(|| name.to_string());
            let key = normalize_name(name);
            if key.is_empty() || dir.ambiguous_keys.contains(&key) {
                continue;
            }
            match dir.id_by_name_key.get(&key).cloned() {
                None => {
                    dir.id_by_name_key.insert(key, id.to_string());
                }
                Some(existing) if existing != id => {
                    dir.ambiguous_keys.insert(key.clone());
                    dir.id_by_name_key.remove(&key);
                }
                Some(_) => {}
            }
        }
        dir
    }

    /// Resolve an (id, display name) pair to a reference. Returns `None`
    /// only when both are blank.
    pub fn resolve(&self, id: &str, name: &str) -> Option<PersonRef> {
        let id = id.trim();
        if !id.is_empty() {
            return Some(PersonRef::Known(id.to_string()));
        }
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        match self.id_by_name_key.get(&key) {
            Some(mapped) => Some(PersonRef::Known(mapped.clone())),
            None => Some(PersonRef::SyntheticName(key)),
        }
    }

    /// Display name for a canonical id, when the directory knows it.
    pub fn display_name(&self, canonical_id: &str) -> Option<&str> {
        self.names_by_id.get(canonical_id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.names_by_id.contains_key(id)
    }

    /// How many normalized names could not be mapped because two ids share
    /// them. Surfaced in dashboards as a data-quality hint.
    pub fn ambiguous_name_count(&self) -> usize {
        self.ambiguous_keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names_by_id
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Registry (store-backed CRUD)
// ---------------------------------------------------------------------------

const PERSON_FIELDS: &[&str] = &["id", "name", "active"];

pub struct PersonRegistry {
    store: Arc<dyn TabularStore>,
    locks: Arc<LockRegistry>,
    config: StoreConfig,
}

impl PersonRegistry {
    pub fn new(
        store: Arc<dyn TabularStore>,
        locks: Arc<LockRegistry>,
        config: StoreConfig,
    ) -> LedgerResult<Self> {
        store.ensure_collection(&config.persons, PERSON_FIELDS)?;
        Ok(PersonRegistry {
            store,
            locks,
            config,
        })
    }

    pub fn list(&self, active_only: bool) -> LedgerResult<Vec<Person>> {
        let mut out: Vec<Person> = self
            .store
            .list_records(&self.config.persons)?
            .iter()
            .filter_map(person_from_record)
            .filter(|p| !active_only || p.active)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn directory(&self) -> LedgerResult<PersonDirectory> {
        let persons = self.list(true)?;
        Ok(PersonDirectory::from_persons(persons.iter()))
    }

    pub fn save(&self, person: Person) -> LedgerResult<Person> {
        if person.name.trim().is_empty() {
            return Err(LedgerError::validation("name", "a person needs a name"));
        }
        let _guard = self
            .locks
            .acquire(EXPENSES_LOCK, self.config.lock_wait())?;
        let person = Person {
            id: if person.id.trim().is_empty() {
                Uuid::new_v4().to_string()
            } else {
                person.id.trim().to_string()
            },
            name: person.name.trim().to_string(),
            active: person.active,
        };
        let mut record = Record::new(&person.id);
        record
            .set("id", &person.id)
            .set("name", &person.name)
            .set("active", person.active);
        self.store
            .upsert_record(&self.config.persons, &person.id, record.fields)?;
        self.store.flush()?;
        Ok(person)
    }

    pub fn delete(&self, id: &str) -> LedgerResult<()> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(());
        }
        let _guard = self
            .locks
            .acquire(EXPENSES_LOCK, self.config.lock_wait())?;
        self.store.delete_record(&self.config.persons, id)?;
        self.store.flush()
    }

    pub fn display_name(&self, id: &str) -> LedgerResult<String> {
        Ok(self
            .directory()?
            .display_name(id)
            .unwrap_or_default()
            .to_string())
    }
}

fn person_from_record(record: &Record) -> Option<Person> {
    let id = record.get("id").trim().to_string();
    if id.is_empty() {
        return None;
    }
    Some(Person {
        id,
        name: record.get("name").trim().to_string(),
        active: parse_bool(record.get("active"), true),
    })
}

/// Truthy parse matching what spreadsheet-style backends hand back.
pub(crate) fn parse_bool(raw: &str, default: bool) -> bool {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return default;
    }
    matches!(s.as_str(), "true" | "1" | "yes" | "si" | "sí")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn person(id: &str, name: &str) -> Person {
        Person {
            id: id.to_string(),
            name: name.to_string(),
            active: true,
        }
    }

    #[test]
    fn normalization_folds_case_accents_and_whitespace() {
        assert_eq!(normalize_name("  María  José "), "maria jose");
        assert_eq!(normalize_name("ÁNGEL"), "angel");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn resolve_prefers_explicit_id() {
        let dir = PersonDirectory::from_persons([person("p1", "Ana")].iter());
        assert_eq!(
            dir.resolve("p9", "Ana"),
            Some(PersonRef::Known("p9".into()))
        );
    }

    #[test]
    fn resolve_maps_names_and_falls_back_to_synthetic() {
        let dir = PersonDirectory::from_persons([person("p1", "Ana"), person("p2", "Beto")].iter());
        assert_eq!(dir.resolve("", "ana"), Some(PersonRef::Known("p1".into())));
        let unknown = dir.resolve("", "Carla X").unwrap();
        assert_eq!(unknown, PersonRef::SyntheticName("carla x".into()));
        assert_eq!(unknown.canonical_id(), "name:carla x");
        assert_eq!(dir.resolve("", "  "), None);
    }

    #[test]
    fn ambiguous_names_resolve_synthetically() {
        let dir =
            PersonDirectory::from_persons([person("p1", "Ana"), person("p2", "ANA")].iter());
        assert_eq!(dir.ambiguous_name_count(), 1);
        assert_eq!(
            dir.resolve("", "Ana"),
            Some(PersonRef::SyntheticName("ana".into()))
        );
    }

    #[test]
    fn canonical_round_trip() {
        let synthetic = PersonRef::SyntheticName("carla x".into());
        assert_eq!(
            PersonRef::from_canonical(&synthetic.canonical_id()),
            Some(synthetic)
        );
        assert_eq!(
            PersonRef::from_canonical("p1"),
            Some(PersonRef::Known("p1".into()))
        );
        assert_eq!(PersonRef::from_canonical("  "), None);
    }
}
