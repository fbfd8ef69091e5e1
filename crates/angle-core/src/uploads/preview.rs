use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::models::PendingUploadId;
use crate::validation::FileSelection;

const PREVIEW_SCHEME: &str = "preview://";

/// Local previews for in-flight uploads, addressed by `preview://` URLs.
///
/// Every preview handed out must be revoked once its upload settles.
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    entries: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl PreviewStore {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Bytes>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, id: PendingUploadId, file: &FileSelection) -> String {
        let url = format!("{PREVIEW_SCHEME}{id}/{}", file.name);
        self.entries().insert(url.clone(), file.bytes.clone());
        url
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.entries().get(url).cloned()
    }

    pub fn revoke(&self, url: &str) -> bool {
        self.entries().remove(url).is_some()
    }

    pub fn revoke_all(&self) -> usize {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Number of previews not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_releases_bytes_once() {
        let store = PreviewStore::default();
        let file = FileSelection::new("cat.jpg", None, vec![7u8; 4]);
        let url = store.create(PendingUploadId::new(), &file);

        assert!(url.starts_with("preview://"));
        assert_eq!(store.get(&url).unwrap().len(), 4);
        assert!(store.revoke(&url));
        assert!(!store.revoke(&url));
        assert_eq!(store.live_count(), 0);
    }
}
