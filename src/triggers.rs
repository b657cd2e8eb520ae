//! Externally owned trigger-word list with change notification.
//! Holds raw strings as the user typed them; sanitizing happens in the session.

use tokio::sync::watch;
use tracing::info;

pub struct TriggerWordStore {
    tx: watch::Sender<Vec<String>>,
}

impl TriggerWordStore {
    pub fn new<S: Into<String>>(initial: impl IntoIterator<Item = S>) -> Self {
        let (tx, _rx) = watch::channel(initial.into_iter().map(Into::into).collect());
        Self { tx }
    }

    /// Replace the list and notify subscribers.
    pub fn set<S: Into<String>>(&self, words: impl IntoIterator<Item = S>) {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        info!(count = words.len(), "trigger_words_updated");
        self.tx.send_replace(words);
    }

    pub fn current(&self) -> Vec<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.tx.subscribe()
    }
}

impl Default for TriggerWordStore {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}
