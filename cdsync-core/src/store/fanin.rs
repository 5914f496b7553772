use crate::digest::ObjectId;
use crate::error::{CdsyncError, Result};

use super::Store;

/// One writable store plus an ordered list of read-only seed stores.
/// `get` cascades writable → seeds in registration order; `put` always
/// targets the writable store.
#[derive(Default)]
pub struct FanIn {
    writable: Option<Box<dyn Store>>,
    seeds: Vec<Box<dyn Store>>,
}

impl FanIn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_writable(&mut self, store: Box<dyn Store>) {
        self.writable = Some(store);
    }

    pub fn add_seed(&mut self, store: Box<dyn Store>) {
        self.seeds.push(store);
    }

    pub fn has_writable(&self) -> bool {
        self.writable.is_some()
    }

    pub fn get(&self, id: &ObjectId) -> Result<Vec<u8>> {
        if let Some(w) = &self.writable {
            match w.get(id) {
                Err(CdsyncError::NotFound) => {}
                other => return other,
            }
        }
        for seed in &self.seeds {
            match seed.get(id) {
                Err(CdsyncError::NotFound) => continue,
                other => return other,
            }
        }
        Err(CdsyncError::NotFound)
    }

    pub fn put(&self, id: &ObjectId, bytes: &[u8]) -> Result<()> {
        match &self.writable {
            Some(w) => w.put(id, bytes),
            None => Err(CdsyncError::ReadOnly),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ObjectDigest;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemStore(Mutex<HashMap<ObjectId, Vec<u8>>>);

    impl MemStore {
        fn new() -> Self {
            Self(Mutex::new(HashMap::new()))
        }
        fn seed(&self, id: ObjectId, bytes: Vec<u8>) {
            self.0.lock().unwrap().insert(id, bytes);
        }
    }

    impl Store for MemStore {
        fn get(&self, id: &ObjectId) -> Result<Vec<u8>> {
            self.0
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(CdsyncError::NotFound)
        }
        fn put(&self, id: &ObjectId, bytes: &[u8]) -> Result<()> {
            self.0.lock().unwrap().insert(*id, bytes.to_vec());
            Ok(())
        }
    }

    fn id_of(bytes: &[u8]) -> ObjectId {
        ObjectDigest::new().digest_one_shot(bytes)
    }

    #[test]
    fn writable_wins_over_seeds() {
        let mut fan = FanIn::new();
        let id = id_of(b"shared-id");

        let writable = MemStore::new();
        writable.seed(id, b"from-writable".to_vec());
        fan.set_writable(Box::new(writable));

        let seed = MemStore::new();
        seed.seed(id, b"from-seed".to_vec());
        fan.add_seed(Box::new(seed));

        assert_eq!(fan.get(&id).unwrap(), b"from-writable");
    }

    #[test]
    fn falls_back_to_first_matching_seed() {
        let mut fan = FanIn::new();
        let id = id_of(b"seed-only");

        fan.set_writable(Box::new(MemStore::new()));

        let seed1 = MemStore::new();
        fan.add_seed(Box::new(seed1));

        let seed2 = MemStore::new();
        seed2.seed(id, b"from-seed-2".to_vec());
        fan.add_seed(Box::new(seed2));

        assert_eq!(fan.get(&id).unwrap(), b"from-seed-2");
    }

    #[test]
    fn not_found_when_exhausted() {
        let mut fan = FanIn::new();
        fan.set_writable(Box::new(MemStore::new()));
        fan.add_seed(Box::new(MemStore::new()));
        let id = id_of(b"missing");
        assert!(matches!(fan.get(&id), Err(CdsyncError::NotFound)));
    }

    #[test]
    fn put_without_writable_is_read_only() {
        let fan = FanIn::new();
        let id = id_of(b"x");
        assert!(matches!(fan.put(&id, b"x"), Err(CdsyncError::ReadOnly)));
    }
}
