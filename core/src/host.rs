use crate::view::{View, ViewId};
use crate::view_tree::ViewTree;
use crossbeam::channel::{self, Receiver, TryRecvError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Host configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// How many render passes [`Host::settle`] runs before giving up.
    ///
    /// A view that requests a render from every render never settles.
    pub max_settle_passes: usize,
}

impl Default for HostConfig {
    fn default() -> HostConfig {
        HostConfig {
            max_settle_passes: 64,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    #[error("render queue did not settle after {passes} passes")]
    Unsettled { passes: usize },

    #[error("no root view is mounted")]
    NotMounted,
}

/// Drives a view tree: mounts the root and executes render requests.
///
/// Render requests made through [`Context::request_render`](crate::Context::request_render) are
/// queued and only executed when the host is polled, so any number of requests for the same view
/// between two polls result in a single render.
pub struct Host {
    tree: ViewTree,
    render_recv: Receiver<ViewId>,
    config: HostConfig,
}

impl Host {
    /// Creates a new Host with nothing mounted.
    pub fn new() -> Host {
        Host::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Host {
        let (render_sender, render_recv) = channel::unbounded();

        Host {
            tree: ViewTree::new(render_sender),
            render_recv,
            config,
        }
    }

    pub fn tree(&self) -> &ViewTree {
        &self.tree
    }

    pub fn config(&self) -> HostConfig {
        self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.tree.root().is_some()
    }

    /// Mounts a root view, or diffs it against the current root if one is mounted.
    ///
    /// The tree is rendered immediately.
    pub fn mount(&mut self, root: Arc<dyn View>) {
        debug!("mounting root {:?}", root);
        self.tree.render_root(root);
    }

    /// Replaces the props of the mounted root view.
    pub fn set_root(&mut self, root: Arc<dyn View>) -> Result<(), HostError> {
        if !self.is_mounted() {
            return Err(HostError::NotMounted);
        }
        self.tree.render_root(root);
        Ok(())
    }

    /// Receives all render requests from the queue and renders the requested views once.
    ///
    /// Returns the number of views whose body was rendered. Requests made while rendering stay
    /// in the queue for the next poll.
    pub fn poll(&mut self) -> usize {
        let mut requested = Vec::new();
        loop {
            match self.render_recv.try_recv() {
                Ok(id) => {
                    if !requested.contains(&id) {
                        requested.push(id);
                    }
                }
                Err(TryRecvError::Empty) => break,
                // the tree holds a sender for as long as the host lives
                Err(TryRecvError::Disconnected) => break,
            }
        }
        if requested.is_empty() {
            return 0;
        }
        self.tree.rebuild(&requested)
    }

    /// Polls until no render requests are left.
    ///
    /// Returns the total number of rendered views.
    pub fn settle(&mut self) -> Result<usize, HostError> {
        let mut rendered = 0;
        for _ in 0..self.config.max_settle_passes {
            if self.render_recv.is_empty() {
                return Ok(rendered);
            }
            rendered += self.poll();
        }
        if self.render_recv.is_empty() {
            return Ok(rendered);
        }
        warn!(
            passes = self.config.max_settle_passes,
            "render queue did not settle"
        );
        Err(HostError::Unsettled {
            passes: self.config.max_settle_passes,
        })
    }

    /// Removes the root view and everything below it.
    pub fn unmount(&mut self) {
        self.tree.unmount_root();
        // whatever was still queued belongs to views that no longer exist
        while self.render_recv.try_recv().is_ok() {}
    }
}

impl Default for Host {
    fn default() -> Host {
        Host::new()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        // give view states the chance to release what they hold
        self.tree.unmount_root();
    }
}
