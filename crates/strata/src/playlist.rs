use parking_lot::Mutex;

/// One entry in the playback queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaItem {
    /// Stable identity; the current pointer is resolved by path equality.
    pub path: String,
    pub title: Option<String>,
}

impl MediaItem {
    #[must_use]
    pub fn new<P: Into<String>>(path: P) -> Self {
        Self {
            path: path.into(),
            title: None,
        }
    }

    #[must_use]
    pub fn with_title<T: Into<String>>(mut self, title: T) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Change notification delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaylistEvent {
    ItemsReplaced,
    CurrentChanged { path: Option<String> },
}

/// Token identifying one subscription; unsubscribe by token, never by
/// callback identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Listener = Box<dyn Fn(&PlaylistEvent) + Send + Sync>;

struct PlaylistInner {
    items: Vec<MediaItem>,
    current_path: Option<String>,
    listeners: Vec<(Subscription, Listener)>,
    next_token: u64,
}

/// Ordered play queue with a current pointer resolved by path equality.
pub struct Playlist {
    inner: Mutex<PlaylistInner>,
}

impl Playlist {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PlaylistInner {
                items: Vec::new(),
                current_path: None,
                listeners: Vec::new(),
                next_token: 0,
            }),
        }
    }

    /// Replace the queue contents. Keeps the current pointer when its path
    /// survives the replacement.
    pub fn set_items(&self, items: Vec<MediaItem>) {
        let event = {
            let mut inner = self.inner.lock();
            inner.items = items;
            let still_present = inner.current_path.as_ref().is_some_and(|path| {
                inner.items.iter().any(|item| item.path == *path)
            });
            if !still_present {
                inner.current_path = None;
            }
            PlaylistEvent::ItemsReplaced
        };
        self.notify(&event);
    }

    #[must_use]
    pub fn items(&self) -> Vec<MediaItem> {
        self.inner.lock().items.clone()
    }

    /// Point at the item with `path`. Returns false when no item matches.
    pub fn set_current_path(&self, path: &str) -> bool {
        let event = {
            let mut inner = self.inner.lock();
            if !inner.items.iter().any(|item| item.path == path) {
                return false;
            }
            inner.current_path = Some(path.to_string());
            PlaylistEvent::CurrentChanged {
                path: inner.current_path.clone(),
            }
        };
        self.notify(&event);
        true
    }

    #[must_use]
    pub fn current(&self) -> Option<MediaItem> {
        let inner = self.inner.lock();
        let path = inner.current_path.as_ref()?;
        inner.items.iter().find(|item| item.path == *path).cloned()
    }

    /// Item after the current one, if any.
    #[must_use]
    pub fn next(&self) -> Option<MediaItem> {
        self.neighbor(1)
    }

    /// Item before the current one, if any.
    #[must_use]
    pub fn previous(&self) -> Option<MediaItem> {
        self.neighbor(-1)
    }

    fn neighbor(&self, offset: i64) -> Option<MediaItem> {
        let inner = self.inner.lock();
        let path = inner.current_path.as_ref()?;
        let position = inner.items.iter().position(|item| item.path == *path)?;
        let target = i64::try_from(position).ok()? + offset;
        let target = usize::try_from(target).ok()?;
        inner.items.get(target).cloned()
    }

    /// Register a change listener; the token unsubscribes it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlaylistEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = Subscription(inner.next_token);
        inner.listeners.push((token, Box::new(listener)));
        token
    }

    pub fn unsubscribe(&self, token: Subscription) {
        self.inner
            .lock()
            .listeners
            .retain(|(existing, _)| *existing != token);
    }

    fn notify(&self, event: &PlaylistEvent) {
        // Listeners run under the lock and must not call back into the
        // playlist.
        let inner = self.inner.lock();
        for (_, listener) in &inner.listeners {
            listener(event);
        }
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}
