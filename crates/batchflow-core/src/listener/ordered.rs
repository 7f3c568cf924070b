use std::sync::Arc;

/// Listeners in notification order.
///
/// Listeners registered with an order are sorted ascending (stable for equal
/// orders) and come before listeners registered without one, which keep
/// their registration order. Registering the same `Arc` twice is a no-op.
pub struct OrderedComposite<T: ?Sized> {
    ordered: Vec<(i32, Arc<T>)>,
    unordered: Vec<Arc<T>>,
}

impl<T: ?Sized> OrderedComposite<T> {
    /// Empty composite
    pub fn new() -> Self {
        Self {
            ordered: Vec::new(),
            unordered: Vec::new(),
        }
    }

    fn contains(&self, item: &Arc<T>) -> bool {
        let target = Arc::as_ptr(item) as *const ();
        self.ordered
            .iter()
            .map(|(_, existing)| existing)
            .chain(self.unordered.iter())
            .any(|existing| Arc::as_ptr(existing) as *const () == target)
    }

    /// Register without an order
    pub fn register(&mut self, item: Arc<T>) {
        if !self.contains(&item) {
            self.unordered.push(item);
        }
    }

    /// Register with an explicit order; lower values are notified first
    pub fn register_with_order(&mut self, item: Arc<T>, order: i32) {
        if self.contains(&item) {
            return;
        }
        let position = self
            .ordered
            .iter()
            .position(|(existing, _)| *existing > order)
            .unwrap_or(self.ordered.len());
        self.ordered.insert(position, (order, item));
    }

    /// Forward order, for "before" callbacks
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<T>> {
        self.ordered
            .iter()
            .map(|(_, item)| item)
            .chain(self.unordered.iter())
    }

    /// Reverse order, for "after" and error callbacks
    pub fn reverse(&self) -> impl Iterator<Item = &Arc<T>> {
        self.iter().rev()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.ordered.len() + self.unordered.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for OrderedComposite<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for OrderedComposite<T> {
    fn clone(&self) -> Self {
        Self {
            ordered: self.ordered.clone(),
            unordered: self.unordered.clone(),
        }
    }
}
