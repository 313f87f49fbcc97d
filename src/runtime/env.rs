use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

/// One frame of the tree-walker's name→value chain.
///
/// Blocks push a child frame; closures capture their defining frame so a
/// returned function keeps its environment alive. Bindings are immutable
/// once defined (`const` semantics), so the chain never needs frames to be
/// re-entered mutably.
#[derive(Debug, Clone)]
pub struct Env {
    inner: Rc<RefCell<Frame>>,
}

#[derive(Debug)]
struct Frame {
    store: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Env {
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    pub fn enclosed(parent: &Env) -> Self {
        Self::with_parent(Some(parent.clone()))
    }

    fn with_parent(parent: Option<Env>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Frame {
                store: HashMap::new(),
                parent,
            })),
        }
    }

    /// Looks the name up through the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let frame = self.inner.borrow();
        if let Some(value) = frame.store.get(name) {
            return Some(value.clone());
        }
        frame.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Binds in the current frame only; shadowing an outer binding is fine,
    /// redefining within the same frame is not.
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut frame = self.inner.borrow_mut();
        if frame.store.contains_key(name) {
            return Err(RuntimeError::AlreadyDefined {
                name: name.to_string(),
            });
        }
        frame.store.insert(name.to_string(), value);
        Ok(())
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_through_parent_chain() {
        let root = Env::new();
        root.set("a", Value::Integer(1)).expect("define a");
        let child = Env::enclosed(&root);
        child.set("b", Value::Integer(2)).expect("define b");

        assert_eq!(child.get("a"), Some(Value::Integer(1)));
        assert_eq!(child.get("b"), Some(Value::Integer(2)));
        assert_eq!(root.get("b"), None);
    }

    #[test]
    fn child_frames_shadow_without_touching_parent() {
        let root = Env::new();
        root.set("x", Value::Integer(1)).expect("define x");
        let child = Env::enclosed(&root);
        child.set("x", Value::Integer(2)).expect("shadow x");

        assert_eq!(child.get("x"), Some(Value::Integer(2)));
        assert_eq!(root.get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn rejects_redefinition_in_same_frame() {
        let env = Env::new();
        env.set("x", Value::Integer(1)).expect("define x");
        let err = env.set("x", Value::Integer(2)).expect_err("redefine x");
        assert_eq!(
            err,
            RuntimeError::AlreadyDefined {
                name: "x".to_string()
            }
        );
    }
}
