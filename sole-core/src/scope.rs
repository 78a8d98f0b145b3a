use sole_ast::{Span, TypeRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub u32);

/// What a consuming use looked like, kept for diagnostics and for telling a
/// transfer of ownership apart from an ordinary read at scope exit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumeKind {
    Read,
    FieldAccess(String),
    Matched,
    Returned,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BindingState {
    Live,
    Consumed { at: Span, kind: ConsumeKind },
}

impl BindingState {
    pub fn is_live(&self) -> bool {
        matches!(self, BindingState::Live)
    }
}

#[derive(Clone, Debug)]
pub struct Binding {
    pub id: BindingId,
    pub name: String,
    pub ty: TypeRef,
    pub span: Span,
    /// Whether the checker tracks consumption for this binding at all.
    pub linear: bool,
    pub state: BindingState,
    /// Declaration slot within the enclosing scope. Discarded values reserve
    /// slots too, so releases interleave with bindings in source order.
    pub seq: u32,
}

struct ScopeFrame {
    bindings: Vec<Binding>,
    next_seq: u32,
}

/// Lexically scoped binding table. Branch-sensitive checking snapshots the
/// whole state vector, replays each arm from the snapshot, and compares the
/// outcomes.
pub struct ScopeStack {
    scopes: Vec<ScopeFrame>,
    next_id: u32,
}

/// Binding states at one point of the walk, indexed scope-by-scope. Only
/// meaningful against the stack shape it was taken from.
#[derive(Clone, Debug)]
pub struct Snapshot(Vec<Vec<BindingState>>);

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(ScopeFrame {
            bindings: Vec::new(),
            next_seq: 0,
        });
    }

    /// Pops the innermost scope and hands its bindings back in declaration
    /// order for exit triage.
    pub fn pop_scope(&mut self) -> Vec<Binding> {
        let frame = self.scopes.pop();
        debug_assert!(frame.is_some(), "pop on an empty scope stack");
        frame.map(|f| f.bindings).unwrap_or_default()
    }

    pub fn declare(&mut self, name: String, ty: TypeRef, span: Span, linear: bool) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        let frame = self.scopes.last_mut().expect("scope stack");
        let seq = frame.next_seq;
        frame.next_seq += 1;
        frame.bindings.push(Binding {
            id,
            name,
            ty,
            span,
            linear,
            state: BindingState::Live,
            seq,
        });
        id
    }

    /// Claims a declaration slot without a binding, for discarded values
    /// whose release must still happen in source position order.
    pub fn reserve_seq(&mut self) -> u32 {
        let frame = self.scopes.last_mut().expect("scope stack");
        let seq = frame.next_seq;
        frame.next_seq += 1;
        seq
    }

    /// Innermost binding with the given name, honoring shadowing.
    pub fn find(&self, name: &str) -> Option<&Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.bindings.iter().rev().find(|b| b.name == name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|frame| frame.bindings.iter_mut().rev().find(|b| b.name == name))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(
            self.scopes
                .iter()
                .map(|frame| frame.bindings.iter().map(|b| b.state.clone()).collect())
                .collect(),
        )
    }

    pub fn restore(&mut self, snap: &Snapshot) {
        debug_assert_eq!(snap.0.len(), self.scopes.len(), "snapshot shape mismatch");
        for (frame, states) in self.scopes.iter_mut().zip(&snap.0) {
            debug_assert_eq!(states.len(), frame.bindings.len(), "snapshot shape mismatch");
            for (binding, state) in frame.bindings.iter_mut().zip(states) {
                binding.state = state.clone();
            }
        }
    }

    /// Bindings whose liveness differs between the two snapshots. Consumed at
    /// different spans in different arms is still consistent; only
    /// live-versus-consumed counts as divergence.
    pub fn diverging<'a>(&'a self, a: &Snapshot, b: &Snapshot) -> Vec<&'a Binding> {
        let mut out = Vec::new();
        for (frame, (sa, sb)) in self.scopes.iter().zip(a.0.iter().zip(&b.0)) {
            for (binding, (st_a, st_b)) in frame.bindings.iter().zip(sa.iter().zip(sb)) {
                if binding.linear && st_a.is_live() != st_b.is_live() {
                    out.push(binding);
                }
            }
        }
        out
    }
}
