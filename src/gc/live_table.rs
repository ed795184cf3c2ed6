//! Table of live wrappers, used only for teardown bookkeeping.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::object::{Wrapper, WrapperId};

/// Every wrapper created while the table exists registers here and
/// deregisters when destroyed. Entries do not own the wrapper.
#[derive(Default)]
pub struct LiveWrapperTable {
    wrappers: HashMap<WrapperId, Weak<Wrapper>>,
}

impl LiveWrapperTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, wrapper: &Rc<Wrapper>) {
        let previous = self
            .wrappers
            .insert(wrapper.id(), Rc::downgrade(wrapper));

        assert!(
            previous.is_none(),
            "wrapper {:?} registered twice in live table",
            wrapper.id()
        );
    }

    pub fn remove(&mut self, id: WrapperId) -> bool {
        self.wrappers.remove(&id).is_some()
    }

    pub fn contains(&self, id: WrapperId) -> bool {
        self.wrappers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Consume the table, yielding the wrappers still alive in creation order.
    pub(crate) fn into_live(self) -> Vec<Rc<Wrapper>> {
        let mut live: Vec<_> = self
            .wrappers
            .into_values()
            .filter_map(|wrapper| wrapper.upgrade())
            .collect();

        live.sort_by_key(|wrapper| wrapper.id());
        live
    }
}

impl std::fmt::Debug for LiveWrapperTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveWrapperTable")
            .field("wrappers", &self.wrappers.len())
            .finish()
    }
}
