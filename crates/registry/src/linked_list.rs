// registry/src/linked_list.rs

use darknode_crypto::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Links {
    prev: Option<Address>,
    next: Option<Address>,
}

/// Doubly-linked list of addresses keyed by the address itself.
///
/// Insertion appends at the tail; removal unlinks in place. Iteration order
/// is insertion order and stays stable across unrelated removals, so an
/// element can serve as a pagination cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedList {
    head: Option<Address>,
    tail: Option<Address>,
    links: HashMap<Address, Links>,
}

impl LinkedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, key: &Address) -> bool {
        self.links.contains_key(key)
    }

    pub fn begin(&self) -> Option<Address> {
        self.head
    }

    pub fn end(&self) -> Option<Address> {
        self.tail
    }

    pub fn next(&self, key: &Address) -> Option<Address> {
        self.links.get(key).and_then(|l| l.next)
    }

    pub fn prev(&self, key: &Address) -> Option<Address> {
        self.links.get(key).and_then(|l| l.prev)
    }

    /// Append `key` at the tail. Returns false if already present.
    pub fn append(&mut self, key: Address) -> bool {
        if self.contains(&key) {
            return false;
        }

        let links = Links {
            prev: self.tail,
            next: None,
        };
        match self.tail {
            Some(tail) => {
                if let Some(tail_links) = self.links.get_mut(&tail) {
                    tail_links.next = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.links.insert(key, links);
        true
    }

    /// Unlink `key`. Returns false if it was not present.
    pub fn remove(&mut self, key: &Address) -> bool {
        let Some(links) = self.links.remove(key) else {
            return false;
        };

        match links.prev {
            Some(prev) => {
                if let Some(prev_links) = self.links.get_mut(&prev) {
                    prev_links.next = links.next;
                }
            }
            None => self.head = links.next,
        }
        match links.next {
            Some(next) => {
                if let Some(next_links) = self.links.get_mut(&next) {
                    next_links.prev = links.prev;
                }
            }
            None => self.tail = links.prev,
        }
        true
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

pub struct Iter<'a> {
    list: &'a LinkedList,
    cursor: Option<Address>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        let current = self.cursor?;
        self.cursor = self.list.next(&current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(i: u8) -> Address {
        Address::new([i; 20])
    }

    #[test]
    fn test_append_order() {
        let mut list = LinkedList::new();
        assert!(list.append(addr(1)));
        assert!(list.append(addr(2)));
        assert!(list.append(addr(3)));
        assert!(!list.append(addr(2)));

        assert_eq!(list.iter().collect::<Vec<_>>(), vec![addr(1), addr(2), addr(3)]);
        assert_eq!(list.begin(), Some(addr(1)));
        assert_eq!(list.end(), Some(addr(3)));
        assert_eq!(list.prev(&addr(3)), Some(addr(2)));
    }

    #[test]
    fn test_remove_middle_head_tail() {
        let mut list = LinkedList::new();
        for i in 1..=4 {
            list.append(addr(i));
        }

        assert!(list.remove(&addr(2)));
        assert_eq!(list.next(&addr(1)), Some(addr(3)));
        assert!(list.remove(&addr(1)));
        assert_eq!(list.begin(), Some(addr(3)));
        assert!(list.remove(&addr(4)));
        assert_eq!(list.end(), Some(addr(3)));
        assert!(!list.remove(&addr(4)));

        assert_eq!(list.iter().collect::<Vec<_>>(), vec![addr(3)]);
        assert!(list.remove(&addr(3)));
        assert!(list.is_empty());
        assert_eq!(list.begin(), None);
        assert_eq!(list.end(), None);
    }

    #[test]
    fn test_reappend_moves_to_tail() {
        let mut list = LinkedList::new();
        list.append(addr(1));
        list.append(addr(2));
        list.remove(&addr(1));
        list.append(addr(1));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![addr(2), addr(1)]);
    }

    proptest! {
        #[test]
        fn prop_matches_vec_model(ops in proptest::collection::vec((any::<bool>(), 0u8..16), 0..64)) {
            let mut list = LinkedList::new();
            let mut model: Vec<Address> = Vec::new();

            for (insert, key) in ops {
                let key = addr(key);
                if insert {
                    let added = list.append(key);
                    prop_assert_eq!(added, !model.contains(&key));
                    if added {
                        model.push(key);
                    }
                } else {
                    let removed = list.remove(&key);
                    prop_assert_eq!(removed, model.contains(&key));
                    model.retain(|k| *k != key);
                }
            }

            prop_assert_eq!(list.iter().collect::<Vec<_>>(), model.clone());
            prop_assert_eq!(list.len(), model.len());
            prop_assert_eq!(list.end(), model.last().copied());
        }
    }
}
