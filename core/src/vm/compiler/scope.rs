use crate::vm::ValueType;

#[derive(Debug, Clone)]
pub(crate) struct Local {
    pub name: String,
    pub ty: ValueType,
    /// Frame depth in bytes right after this slot was allocated.
    pub depth: usize,
}

/// Compile-time mirror of the variable frame.
///
/// Slots are released strictly in reverse allocation order, so the frame is a stack
/// of lexical scopes. The frame-relative offset of a local is the current depth
/// minus the depth recorded when its slot was allocated.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    scopes: Vec<Vec<Local>>,
    depth: usize,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn push(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost scope, returning its locals in release order.
    pub fn pop(&mut self) -> Vec<Local> {
        let mut locals = self.scopes.pop().unwrap_or_default();
        locals.reverse();
        for local in &locals {
            self.depth -= local.ty.width();
        }
        locals
    }

    pub fn declared_in_current(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.iter().any(|l| l.name == name))
    }

    pub fn declare(&mut self, name: &str, ty: ValueType) {
        self.depth += ty.width();
        let local = Local {
            name: name.to_string(),
            ty,
            depth: self.depth,
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(local);
        }
    }

    /// Innermost visible local named `name` and its current frame offset.
    pub fn resolve(&self, name: &str) -> Option<(&Local, usize)> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|l| l.name == name)
            .map(|l| (l, self.depth - l.depth))
    }

    /// Every live local, innermost first, without closing any scope.
    pub fn all_live(&self) -> Vec<Local> {
        self.scopes.iter().rev().flat_map(|scope| scope.iter().rev()).cloned().collect()
    }
}
