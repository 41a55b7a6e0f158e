//! The component lifecycle.
//!
//! A component optionally loads data in [`Component::create`], renders HTML
//! into its destination slot, wires up the painted elements in
//! [`Component::post_render`] and then lets its children do the same.
//!
//! ```text
//! create_and_build:
//!   paint loading placeholder
//!   create().await
//!   paint render() + post_render()
//!   children: create_and_build (concurrently, wait for all)
//!   post_children_built()
//! ```
//!
//! Children's destination slots are expected to be part of the parent's
//! rendered HTML, so a parent's own paint always happens before any child
//! paints. A slot that is missing at paint time fails the build with
//! [`SpaError::DestinationNotFound`], logged with the chain of ancestor ids.

use async_trait::async_trait;
use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use tracing::warn;

use crate::env::Env;
use crate::error::{Result, SpaError};
use crate::slot::Slot;

/// A node in the component tree.
///
/// Only [`render`](Self::render) is mandatory. Lifecycle hooks are driven by
/// [`create_and_build`], [`rebuild`] and [`rebuild_and_recreate_children`];
/// components should not call them on themselves.
#[async_trait(?Send)]
pub trait Component {
    /// This component's slot.
    fn slot(&self) -> &Slot;

    /// This component's children, in paint order.
    fn children_mut(&mut self) -> Vec<&mut dyn Component> {
        Vec::new()
    }

    /// Loads data, prepares state and constructs children. Must not paint.
    async fn create(&mut self, _env: &Env) -> Result<()> {
        Ok(())
    }

    /// Produces the HTML for the current state.
    fn render(&self, env: &Env) -> Result<String>;

    /// Produces placeholder HTML shown while [`create`](Self::create) runs.
    fn render_loading(&self, _env: &Env) -> Result<Option<String>> {
        Ok(None)
    }

    /// Runs after the rendered HTML has been attached to the slot.
    fn post_render(&mut self, _env: &Env) -> Result<()> {
        Ok(())
    }

    /// Runs after every descendant has been built.
    fn post_children_built(&mut self, _env: &Env) -> Result<()> {
        Ok(())
    }
}

/// Creates and builds a component, then recursively creates and builds its
/// children concurrently.
///
/// Resolves only after every descendant's `post_children_built` has run.
/// If any child fails, the remaining siblings still run to completion, the
/// first failure is returned and no slot in the subtree reports built.
pub fn create_and_build<'a>(
    component: &'a mut dyn Component,
    env: &'a Env,
) -> LocalBoxFuture<'a, Result<()>> {
    async move {
        component.slot().set_built(false);
        paint_loading(component, env)?;
        component.create(env).await?;
        build_this(component, env)?;
        if let Err(e) = build_children(component, env).await {
            unmark_built(component);
            return Err(e);
        }
        component.post_children_built(env)?;
        component.slot().set_built(true);
        Ok(())
    }
    .boxed_local()
}

/// Repaints a component and all its descendants without running `create`.
pub fn rebuild(component: &mut dyn Component, env: &Env) -> Result<()> {
    component.slot().set_built(false);
    build_this(component, env)?;
    let rebuilt: Result<()> = component
        .children_mut()
        .into_iter()
        .try_for_each(|child| rebuild(child, env));
    if let Err(e) = rebuilt {
        unmark_built(component);
        return Err(e);
    }
    component.post_children_built(env)?;
    component.slot().set_built(true);
    Ok(())
}

/// Repaints a component, then fully creates and builds its children again.
pub async fn rebuild_and_recreate_children(
    component: &mut dyn Component,
    env: &Env,
) -> Result<()> {
    component.slot().set_built(false);
    build_this(component, env)?;
    if let Err(e) = build_children(component, env).await {
        unmark_built(component);
        return Err(e);
    }
    component.post_children_built(env)?;
    component.slot().set_built(true);
    Ok(())
}

/// Empties a component's slot. Any later build paints it again.
pub fn clear(component: &dyn Component, env: &Env) -> Result<()> {
    component.slot().set_built(false);
    env.dom().clear(component.slot().id())
}

/// Paints a component and runs its `post_render`, leaving children alone.
pub fn build_this(component: &mut dyn Component, env: &Env) -> Result<()> {
    let html = component.render(env)?;
    paint(component.slot(), env, &html)?;
    component.post_render(env)
}

/// Paints HTML into a slot.
///
/// A missing destination is logged with the ancestor chain and reported as
/// [`SpaError::DestinationNotFound`].
pub fn paint(slot: &Slot, env: &Env, html: &str) -> Result<()> {
    match env.dom().set_inner_html(slot.id(), html) {
        Err(SpaError::ElementNotFound(id)) => {
            let trace = slot.ancestry().join(" > ");
            warn!(
                destination = %id,
                trace = %trace,
                "Couldn't find destination when painting component"
            );
            Err(SpaError::DestinationNotFound { id, trace })
        }
        other => other,
    }
}

fn paint_loading(component: &dyn Component, env: &Env) -> Result<()> {
    match component.render_loading(env)? {
        Some(html) => paint(component.slot(), env, &html),
        None => Ok(()),
    }
}

/// Marks a component and all its descendants as not built.
fn unmark_built(component: &mut dyn Component) {
    component.slot().set_built(false);
    for child in component.children_mut() {
        unmark_built(child);
    }
}

async fn build_children(component: &mut dyn Component, env: &Env) -> Result<()> {
    let builds = component
        .children_mut()
        .into_iter()
        .map(|child| create_and_build(child, env));
    join_all(builds).await.into_iter().collect()
}
