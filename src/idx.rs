use std::borrow::Borrow;

pub trait Index: Clone + Copy + From<usize> + Into<usize> {}

/// Sparse storage keyed by a dense index type.
///
/// Slots are allocated for a fixed index range (usually the vertex count of
/// the mesh being edited). Operators keep their per-vertex baseline here and
/// call [`IndexedStore::reset`] whenever the range changes, so a store never
/// outlives the buffer length it was sized for.
#[derive(Clone, Debug)]
pub struct IndexedStore<I: Index, T> {
    array: Vec<Option<T>>,
    size: usize,
    _index: std::marker::PhantomData<I>,
}

impl<I: Index, T> Default for IndexedStore<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Index, T> IndexedStore<I, T> {
    pub fn new() -> Self {
        Self {
            array: vec![],
            size: 0,
            _index: std::marker::PhantomData,
        }
    }

    /// Creates a store with `len` empty slots.
    pub fn with_len(len: usize) -> Self {
        let mut store = Self::new();
        store.reset(len);
        store
    }

    /// Empties every slot and resizes the store to exactly `len` slots.
    pub fn reset(&mut self, len: usize) {
        self.array.clear();
        self.array.resize_with(len, || None);
        self.size = 0;
    }

    /// Number of slots, occupied or not.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn is_sized_for(&self, len: usize) -> bool {
        self.array.len() == len
    }

    pub fn indices(&self) -> IndexedStoreKeyIter<'_, I, T> {
        IndexedStoreKeyIter {
            store: self,
            index: 0,
        }
    }

    pub fn contains<K: Borrow<I>>(&self, index: K) -> bool {
        self.get(index).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.array
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| Some((I::from(i), slot.as_ref()?)))
    }

    pub fn get<K: Borrow<I>>(&self, index: K) -> Option<&T> {
        match self.array.get((*index.borrow()).into()) {
            Some(t) => t.as_ref(),
            None => None,
        }
    }

    /// Stores `value` at `index`, returning the previous value.
    ///
    /// Slots past the end are allocated on demand.
    pub fn set<K: Borrow<I>>(&mut self, index: K, value: T) -> Option<T> {
        let i: usize = (*index.borrow()).into();
        if self.array.len() <= i {
            self.array.resize_with(i + 1, || None);
        }
        let old = self.array[i].replace(value);
        if old.is_none() {
            self.size += 1;
        }
        old
    }

    pub fn remove<K: Borrow<I>>(&mut self, index: K) -> Option<T> {
        let item = self
            .array
            .get_mut((*index.borrow()).into())
            .and_then(Option::take);
        if item.is_some() {
            self.size -= 1;
        }
        item
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.size
    }
}

pub struct IndexedStoreKeyIter<'a, I: Index, T> {
    store: &'a IndexedStore<I, T>,
    index: usize,
}

impl<I: Index, T> Iterator for IndexedStoreKeyIter<'_, I, T> {
    type Item = I;

    fn next(&mut self) -> Option<I> {
        while self.index < self.store.array.len() {
            let index = self.index;
            self.index += 1;
            if self.store.array[index].is_some() {
                return Some(I::from(index));
            }
        }
        None
    }
}

impl<K: Borrow<I>, I: Index, T> std::ops::Index<K> for IndexedStore<I, T> {
    type Output = T;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index).expect("no value stored at index")
    }
}

impl<K: Borrow<I>, I: Index, T> std::ops::IndexMut<K> for IndexedStore<I, T> {
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        self.array[(*index.borrow()).into()]
            .as_mut()
            .expect("no value stored at index")
    }
}
