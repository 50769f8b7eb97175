//! Shared backing instances and paths into them.
//!
//! A `DynamicMessage` owns its nested messages, lists and maps inline, so a
//! proxy for a nested aggregate cannot hold a reference to it. Instead every
//! proxy holds a [`MessageHandle`]: the reference-counted root instance plus
//! the path of steps leading from the root down to the message it views.
//! Reads and writes walk the path on every access, so all proxies over the
//! same root observe each other's mutations immediately.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use prost_reflect::{
    DynamicMessage, FieldDescriptor, MapKey, MessageDescriptor, ReflectMessage, Value,
};

use crate::error::ProtoError;

/// The root instance shared by every proxy derived from it.
pub type SharedMessage = Rc<RefCell<DynamicMessage>>;

/// Where a nested message sits inside its parent field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    /// The field itself holds the message.
    Whole,
    /// Element of a repeated message field (0-based).
    Index(usize),
    /// Value of a message-valued map field.
    Key(MapKey),
}

#[derive(Debug, Clone)]
struct Step {
    field: FieldDescriptor,
    slot: Slot,
    /// Type of the message reached by this step.
    target: MessageDescriptor,
}

/// A view of one message inside a shared root instance.
#[derive(Clone)]
pub struct MessageHandle {
    root: SharedMessage,
    steps: Rc<[Step]>,
    descriptor: MessageDescriptor,
}

impl MessageHandle {
    /// Take ownership of `msg` and make it a new root.
    pub fn new(msg: DynamicMessage) -> Self {
        Self::from_shared(Rc::new(RefCell::new(msg)))
    }

    /// View an instance the host already shares.
    pub fn from_shared(root: SharedMessage) -> Self {
        let descriptor = root.borrow().descriptor();
        Self {
            root,
            steps: Rc::from(Vec::new()),
            descriptor,
        }
    }

    /// Schema of the viewed message.
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// The shared root instance.
    pub fn root(&self) -> &SharedMessage {
        &self.root
    }

    /// True if this handle views the root itself.
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Handle for the message stored in `field` (at `slot`) of this message.
    pub(crate) fn child(&self, field: &FieldDescriptor, slot: Slot, target: MessageDescriptor) -> Self {
        let mut steps: Vec<Step> = self.steps.iter().cloned().collect();
        steps.push(Step {
            field: field.clone(),
            slot,
            target: target.clone(),
        });
        Self {
            root: self.root.clone(),
            steps: Rc::from(steps),
            descriptor: target,
        }
    }

    /// Run `f` against the viewed message.
    ///
    /// If an intermediate element has gone away since the handle was made,
    /// `f` sees an empty message of the expected type.
    pub fn read<R>(&self, f: impl FnOnce(&DynamicMessage) -> R) -> R {
        let root = self.root.borrow();
        descend(&root, &self.steps, f)
    }

    /// Run `f` against the viewed message, mutably.
    pub fn write<R>(&self, f: impl FnOnce(&mut DynamicMessage) -> R) -> Result<R, ProtoError> {
        let mut root = self.root.borrow_mut();
        descend_mut(&mut root, &self.steps, f).ok_or_else(|| ProtoError::Detached {
            message: self.descriptor.full_name().to_string(),
        })
    }

    /// Copy of the viewed message's current contents.
    pub fn snapshot(&self) -> DynamicMessage {
        self.read(|msg| msg.clone())
    }

    /// Copy of the current value of `field` in the viewed message.
    pub(crate) fn field_snapshot(&self, field: &FieldDescriptor) -> Value {
        self.read(|msg| msg.get_field(field).into_owned())
    }
}

fn descend<R>(msg: &DynamicMessage, steps: &[Step], f: impl FnOnce(&DynamicMessage) -> R) -> R {
    let Some((step, rest)) = steps.split_first() else {
        return f(msg);
    };
    let value: Cow<'_, Value> = msg.get_field(&step.field);
    let next = match (value.as_ref(), &step.slot) {
        (Value::Message(m), Slot::Whole) => Some(m),
        (Value::List(items), Slot::Index(i)) => match items.get(*i) {
            Some(Value::Message(m)) => Some(m),
            _ => None,
        },
        (Value::Map(entries), Slot::Key(key)) => match entries.get(key) {
            Some(Value::Message(m)) => Some(m),
            _ => None,
        },
        _ => None,
    };
    match next {
        Some(m) => descend(m, rest, f),
        None => descend(&DynamicMessage::new(step.target.clone()), rest, f),
    }
}

fn descend_mut<R>(
    msg: &mut DynamicMessage,
    steps: &[Step],
    f: impl FnOnce(&mut DynamicMessage) -> R,
) -> Option<R> {
    let Some((step, rest)) = steps.split_first() else {
        return Some(f(msg));
    };
    if !msg.has_field(&step.field) {
        return None;
    }
    let next = match (msg.get_field_mut(&step.field), &step.slot) {
        (Value::Message(m), Slot::Whole) => Some(m),
        (Value::List(items), Slot::Index(i)) => match items.get_mut(*i) {
            Some(Value::Message(m)) => Some(m),
            _ => None,
        },
        (Value::Map(entries), Slot::Key(key)) => match entries.get_mut(key) {
            Some(Value::Message(m)) => Some(m),
            _ => None,
        },
        _ => None,
    }?;
    descend_mut(next, rest, f)
}
