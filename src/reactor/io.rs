use std::cell::RefCell;
use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// Callback run when a watched descriptor becomes readable.
pub(crate) type ReadCallback<L> = Rc<RefCell<dyn FnMut(&mut L, RawFd)>>;

/// Per-descriptor state: who to call on readability and what is still
/// waiting to be written.
pub(crate) struct FileState<L> {
    pub(crate) callback: ReadCallback<L>,
    pub(crate) outgoing: Vec<u8>,
}

/// Descriptor to [`FileState`] table. Iteration is in ascending descriptor
/// order.
pub(crate) struct Registry<L> {
    files: BTreeMap<RawFd, FileState<L>>,
}

impl<L> Registry<L> {
    pub(crate) fn new() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }

    /// Installs `callback` for `file_descriptor`, keeping any queued output.
    pub(crate) fn watch(&mut self, file_descriptor: RawFd, callback: ReadCallback<L>) {
        self.files
            .entry(file_descriptor)
            .and_modify(|file| file.callback = Rc::clone(&callback))
            .or_insert_with(|| FileState {
                callback,
                outgoing: Vec::new(),
            });
    }

    pub(crate) fn unwatch(&mut self, file_descriptor: RawFd) -> Option<FileState<L>> {
        self.files.remove(&file_descriptor)
    }

    pub(crate) fn get(&self, file_descriptor: RawFd) -> Option<&FileState<L>> {
        self.files.get(&file_descriptor)
    }

    pub(crate) fn get_mut(&mut self, file_descriptor: RawFd) -> Option<&mut FileState<L>> {
        self.files.get_mut(&file_descriptor)
    }

    pub(crate) fn contains(&self, file_descriptor: RawFd) -> bool {
        self.files.contains_key(&file_descriptor)
    }

    /// One past the highest watched descriptor, 0 when empty.
    pub(crate) fn bound(&self) -> usize {
        self.files
            .last_key_value()
            .map_or(0, |(&file_descriptor, _)| file_descriptor as usize + 1)
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (RawFd, &FileState<L>)> {
        self.files
            .iter()
            .map(|(&file_descriptor, file)| (file_descriptor, file))
    }

    pub(crate) fn clear(&mut self) {
        self.files.clear();
    }
}
