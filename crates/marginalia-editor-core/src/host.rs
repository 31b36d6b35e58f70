//! Traits the embedding application implements.
//!
//! The engine never mutates the document or navigates on its own. Text
//! changes, note navigation and mode notifications all go out through
//! [`EditorHost`]; note lookups and image URLs come in through
//! [`EntryStore`] and [`ImageResolver`].
//!
//! Unit, reference and `Option` implementations are provided so callers can
//! pass `()` when they have nothing to offer.

use smol_str::SmolStr;

use crate::mode::Mode;
use crate::types::TextEdit;

/// Receives everything the engine asks the application to do.
pub trait EditorHost {
    /// Apply a replacement to the document. The only write path.
    fn apply_edit(&mut self, edit: TextEdit);

    /// Navigate to an existing note.
    fn request_open(&mut self, _title: &str) {}

    /// Offer to create a note that does not exist yet.
    fn request_create(&mut self, _title: &str) {}

    /// The editing mode was set.
    fn mode_changed(&mut self, _mode: Mode) {}
}

/// Everything an [`EditorHost`] can be asked, as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Edit(TextEdit),
    Open(SmolStr),
    Create(SmolStr),
    ModeChanged(Mode),
}

/// Records requests instead of acting on them.
impl EditorHost for Vec<HostEvent> {
    fn apply_edit(&mut self, edit: TextEdit) {
        self.push(HostEvent::Edit(edit));
    }

    fn request_open(&mut self, title: &str) {
        self.push(HostEvent::Open(title.into()));
    }

    fn request_create(&mut self, title: &str) {
        self.push(HostEvent::Create(title.into()));
    }

    fn mode_changed(&mut self, mode: Mode) {
        self.push(HostEvent::ModeChanged(mode));
    }
}

impl<T: EditorHost + ?Sized> EditorHost for &mut T {
    fn apply_edit(&mut self, edit: TextEdit) {
        (**self).apply_edit(edit)
    }

    fn request_open(&mut self, title: &str) {
        (**self).request_open(title)
    }

    fn request_create(&mut self, title: &str) {
        (**self).request_create(title)
    }

    fn mode_changed(&mut self, mode: Mode) {
        (**self).mode_changed(mode)
    }
}

/// A stored note, as much of it as the editor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: SmolStr,
    pub title: SmolStr,
    pub body: String,
}

/// Read access to the persistent note store.
pub trait EntryStore {
    fn get_entry_by_id(&self, id: &str) -> Option<Entry>;

    fn find_entry_by_title(&self, title: &str) -> Option<Entry>;
}

/// Unit type implementation - empty store.
impl EntryStore for () {
    fn get_entry_by_id(&self, _id: &str) -> Option<Entry> {
        None
    }

    fn find_entry_by_title(&self, _title: &str) -> Option<Entry> {
        None
    }
}

impl<T: EntryStore> EntryStore for &T {
    fn get_entry_by_id(&self, id: &str) -> Option<Entry> {
        (*self).get_entry_by_id(id)
    }

    fn find_entry_by_title(&self, title: &str) -> Option<Entry> {
        (*self).find_entry_by_title(title)
    }
}

/// Linear lookup, for small in-memory stores.
impl EntryStore for Vec<Entry> {
    fn get_entry_by_id(&self, id: &str) -> Option<Entry> {
        self.iter().find(|e| e.id == id).cloned()
    }

    fn find_entry_by_title(&self, title: &str) -> Option<Entry> {
        self.iter()
            .find(|e| e.title.eq_ignore_ascii_case(title.trim()))
            .cloned()
    }
}

impl<T: EntryStore> EntryStore for Option<T> {
    fn get_entry_by_id(&self, id: &str) -> Option<Entry> {
        self.as_ref().and_then(|s| s.get_entry_by_id(id))
    }

    fn find_entry_by_title(&self, title: &str) -> Option<Entry> {
        self.as_ref().and_then(|s| s.find_entry_by_title(title))
    }
}

/// Resolves image URLs from markdown to displayable ones.
///
/// Notes reference attachments by relative path; the host maps those to
/// file or data URLs.
pub trait ImageResolver {
    /// Returns `Some(resolved_url)` if the image is known,
    /// `None` to use the original URL unchanged.
    fn resolve_image_url(&self, url: &str) -> Option<String>;
}

/// Unit type implementation - no image resolution.
impl ImageResolver for () {
    fn resolve_image_url(&self, _url: &str) -> Option<String> {
        None
    }
}

impl<T: ImageResolver> ImageResolver for &T {
    fn resolve_image_url(&self, url: &str) -> Option<String> {
        (*self).resolve_image_url(url)
    }
}

impl<T: ImageResolver> ImageResolver for Option<T> {
    fn resolve_image_url(&self, url: &str) -> Option<String> {
        self.as_ref().and_then(|r| r.resolve_image_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AttachmentResolver;

    impl ImageResolver for AttachmentResolver {
        fn resolve_image_url(&self, url: &str) -> Option<String> {
            if url.starts_with("attachments/") {
                Some(format!("file:///vault/{}", url))
            } else {
                None
            }
        }
    }

    struct OneEntry;

    impl EntryStore for OneEntry {
        fn get_entry_by_id(&self, id: &str) -> Option<Entry> {
            (id == "id-1").then(|| Entry {
                id: "id-1".into(),
                title: "Todo List".into(),
                body: "- [ ] milk".into(),
            })
        }

        fn find_entry_by_title(&self, title: &str) -> Option<Entry> {
            (title == "Todo List").then(|| self.get_entry_by_id("id-1")).flatten()
        }
    }

    #[test]
    fn test_image_resolver() {
        let resolver = AttachmentResolver;
        assert_eq!(
            resolver.resolve_image_url("attachments/cat.png"),
            Some("file:///vault/attachments/cat.png".to_string())
        );
        assert_eq!(resolver.resolve_image_url("https://other.com/img.png"), None);
    }

    #[test]
    fn test_unit_and_option_impls() {
        assert_eq!(().resolve_image_url("anything"), None);
        assert_eq!(().get_entry_by_id("id-1"), None);

        let some_store: Option<OneEntry> = Some(OneEntry);
        assert_eq!(
            some_store.find_entry_by_title("Todo List").map(|e| e.id),
            Some("id-1".into())
        );
        let none_store: Option<OneEntry> = None;
        assert_eq!(none_store.get_entry_by_id("id-1"), None);
    }

    #[test]
    fn test_recording_host() {
        let mut events: Vec<HostEvent> = Vec::new();
        {
            let host = &mut events;
            host.apply_edit(TextEdit::insert(3, "]]"));
            host.request_open("Todo List");
            host.mode_changed(Mode::Reading);
        }
        assert_eq!(
            events,
            vec![
                HostEvent::Edit(TextEdit::insert(3, "]]")),
                HostEvent::Open("Todo List".into()),
                HostEvent::ModeChanged(Mode::Reading),
            ]
        );
    }
}
