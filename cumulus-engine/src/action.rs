//! The `Action` trait and helpers to build actions from plain functions.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::outcome::Outcome;

/// One named step of a reconciliation pipeline.
///
/// Actions must be idempotent with respect to their own preconditions: a
/// step that creates something first checks whether it already exists and
/// treats that as success. This is what allows the same pipeline to run
/// again after a crash or a requeue.
#[async_trait]
pub trait Action<S: Send + 'static>: Send + Sync {
    /// Stable label used in logs and in [`describe`](Action::describe).
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome;

    /// Nested actions, for rendering. Leaf actions have none.
    fn children(&self) -> Vec<&dyn Action<S>> {
        Vec::new()
    }

    /// Render this action and its children as an indented tree.
    fn describe(&self) -> String {
        let mut out = String::new();
        render(self.name(), &self.children(), 0, &mut out);
        out
    }
}

fn render<S: Send + 'static>(name: &str, children: &[&dyn Action<S>], depth: usize, out: &mut String) {
    let _ = writeln!(out, "{:indent$}{}", "", name, indent = depth * 2);
    for child in children {
        render(child.name(), &child.children(), depth + 1, out);
    }
}

/// Shared handle to an action.
pub type ActionRef<S> = Arc<dyn Action<S>>;

/// Pure decision function over the current state.
pub type Predicate<S> = Arc<dyn Fn(&Context, &S) -> bool + Send + Sync>;

/// Wrap a closure as a [`Predicate`].
pub fn predicate<S, F>(f: F) -> Predicate<S>
where
    F: Fn(&Context, &S) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Negate a predicate.
pub fn not<S: 'static>(p: Predicate<S>) -> Predicate<S> {
    Arc::new(move |ctx: &Context, state: &S| !p(ctx, state))
}

/// Action backed by a synchronous function.
///
/// For steps that only inspect or rearrange state. Steps that call a
/// collaborator implement [`Action`] directly.
pub struct FnAction<S> {
    name: String,
    f: Box<dyn Fn(&mut Context, &mut S) -> Outcome + Send + Sync>,
}

#[async_trait]
impl<S: Send + 'static> Action<S> for FnAction<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        (self.f)(ctx, state)
    }
}

/// Build a named action from a synchronous function.
pub fn step<S, F>(name: impl Into<String>, f: F) -> ActionRef<S>
where
    S: Send + 'static,
    F: Fn(&mut Context, &mut S) -> Outcome + Send + Sync + 'static,
{
    Arc::new(FnAction {
        name: name.into(),
        f: Box::new(f),
    })
}
