use std::{fmt, slice, sync::Arc, vec};

use super::{Address, Message};

/// What kind of messages a batch carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchMode {
    Oob,
    Reg,
    Mixed,
}

/// An ordered group of messages from one sender, all addressed to the same
/// destination (or all multicast) within one cluster.
#[derive(Clone)]
pub struct MessageBatch {
    dest: Option<Address>,
    sender: Address,
    cluster: Arc<str>,
    messages: Vec<Message>,
}

impl MessageBatch {
    pub fn new(
        sender: Address,
        dest: Option<Address>,
        cluster: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            dest,
            sender,
            cluster: cluster.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_messages<I>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = Message>,
    {
        self.messages.extend(messages);
        self
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn dest(&self) -> Option<Address> {
        self.dest
    }

    pub fn cluster(&self) -> &Arc<str> {
        &self.cluster
    }

    pub fn is_multicast(&self) -> bool {
        self.dest.is_none()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sum of all payload sizes in bytes.
    pub fn total_size(&self) -> usize {
        self.messages.iter().map(Message::len).sum()
    }

    pub fn iter(&self) -> slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// An empty batch counts as regular.
    pub fn mode(&self) -> BatchMode {
        let oob = self.messages.iter().filter(|m| m.is_oob()).count();
        if oob == 0 {
            BatchMode::Reg
        } else if oob == self.messages.len() {
            BatchMode::Oob
        } else {
            BatchMode::Mixed
        }
    }

    /// Removes every message matching `pred` and returns them in their
    /// original order. The messages left behind keep their order too.
    pub fn remove_if<F>(&mut self, mut pred: F) -> Vec<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.messages.len());
        for msg in self.messages.drain(..) {
            if pred(&msg) {
                removed.push(msg);
            } else {
                kept.push(msg);
            }
        }
        self.messages = kept;
        removed
    }

    /// Moves the OOB messages of a mixed batch into a batch of their own.
    /// Returns `None` if there were none.
    pub fn split_off_oob(&mut self) -> Option<MessageBatch> {
        let oob = self.remove_if(Message::is_oob);
        if oob.is_empty() {
            return None;
        }
        Some(MessageBatch {
            dest: self.dest,
            sender: self.sender,
            cluster: self.cluster.clone(),
            messages: oob,
        })
    }

    pub fn drain(&mut self) -> vec::Drain<'_, Message> {
        self.messages.drain(..)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl IntoIterator for MessageBatch {
    type Item = Message;
    type IntoIter = vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageBatch {
    type Item = &'a Message;
    type IntoIter = slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl fmt::Debug for MessageBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dest = match self.dest {
            Some(dest) => dest.to_string(),
            None => "<all>".to_owned(),
        };
        write!(
            f,
            "batch {} -> {} ({}, {} msgs, {:?})",
            self.sender,
            dest,
            self.cluster,
            self.messages.len(),
            self.mode()
        )
    }
}
