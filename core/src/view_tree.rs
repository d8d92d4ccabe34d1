use crate::context::Context;
use crate::view::{Fragment, State, View, ViewId};
use crossbeam::channel::Sender;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// A node in the view tree.
struct TreeNode {
    /// The current view object.
    view: Arc<dyn View>,
    /// The immediate superview.
    superview: Option<ViewId>,
    /// The view state.
    state: Box<dyn State>,
    /// An ordered list of all subviews.
    subviews: Vec<ViewId>,
    /// The node’s inherited context.
    context: Context,
}

/// A view tree; contains a hierarchy of virtual views and manages rendering and updating.
pub struct ViewTree {
    nodes: HashMap<ViewId, TreeNode>,
    root: Option<ViewId>,
    render_requests: Sender<ViewId>,
    /// Nodes whose body was rendered during the current pass.
    rendered: HashSet<ViewId>,
}

impl ViewTree {
    pub(crate) fn new(render_requests: Sender<ViewId>) -> ViewTree {
        ViewTree {
            nodes: HashMap::new(),
            root: None,
            render_requests,
            rendered: HashSet::new(),
        }
    }

    /// The root node, if anything is mounted.
    pub fn root(&self) -> Option<ViewId> {
        self.root
    }

    /// Number of mounted nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the node is mounted.
    pub fn contains(&self, id: ViewId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Subviews of a node, in order.
    pub fn subviews(&self, id: ViewId) -> &[ViewId] {
        self.nodes.get(&id).map_or(&[], |node| &node.subviews)
    }

    /// The state of a mounted node.
    pub fn state(&self, id: ViewId) -> Option<&dyn State> {
        self.nodes.get(&id).map(|node| &*node.state)
    }

    /// The current view of a mounted node.
    pub fn view(&self, id: ViewId) -> Option<&Arc<dyn View>> {
        self.nodes.get(&id).map(|node| &node.view)
    }

    /// Renders a root view.
    pub fn render_root(&mut self, view: Arc<dyn View>) {
        self.rendered.clear();
        let root_id = match self.root {
            Some(id) => id,
            None => {
                let id = ViewId::new();
                self.root = Some(id);
                id
            }
        };
        let context = Context::root(root_id, self.render_requests.clone());
        self.diff(root_id, &view, context, None);
    }

    /// Renders the bodies of the given nodes again.
    ///
    /// Nodes are rendered top-down; a node that was already rendered as part of an ancestor’s
    /// pass is not rendered twice. Unmounted nodes are skipped. Returns the number of nodes whose
    /// body was rendered.
    pub fn rebuild(&mut self, ids: &[ViewId]) -> usize {
        self.rendered.clear();
        let mut dirty: Vec<(usize, ViewId)> = ids
            .iter()
            .filter_map(|id| self.depth(*id).map(|depth| (depth, *id)))
            .collect();
        dirty.sort_by_key(|(depth, _)| *depth);

        for (_, id) in dirty {
            if !self.rendered.contains(&id) && self.nodes.contains_key(&id) {
                self.render_body(id);
            }
        }
        self.rendered.len()
    }

    /// Removes the root view and everything below it.
    pub fn unmount_root(&mut self) {
        if let Some(root) = self.root.take() {
            debug!(view = ?root, "unmounting root");
            self.remove_view(root);
        }
    }

    fn depth(&self, id: ViewId) -> Option<usize> {
        let mut node = self.nodes.get(&id)?;
        let mut depth = 0;
        while let Some(superview) = node.superview {
            node = self.nodes.get(&superview)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Diffs a view with its current state in the tree.
    ///
    /// - `id`: the view id, for identifying the tree node
    /// - `view`: the new view
    /// - `context`: the context inherited from the superview
    fn diff(
        &mut self,
        id: ViewId,
        view: &Arc<dyn View>,
        context: Context,
        superview: Option<ViewId>,
    ) {
        let needs_render = if let Some(node) = self.nodes.get(&id) {
            if node.view.as_any().type_id() == view.as_any().type_id() {
                // same type; can be diffed
                let changed_view = !node.view.eq(&**view);
                let changed_dependencies = !node.context.same_dependencies(&context);
                if changed_view {
                    self.update_view(id, view);
                }
                if changed_dependencies {
                    self.update_dependencies(id, context);
                }
                changed_view || changed_dependencies
            } else {
                // different type; needs to be replaced
                self.replace_view(id, view, context);
                true
            }
        } else {
            // does not exist; needs to be added
            self.add_view(id, view, context, superview);
            true
        };

        if needs_render {
            self.render_body(id);
        }
    }

    /// Adds a new view to the tree.
    fn add_view(
        &mut self,
        id: ViewId,
        view: &Arc<dyn View>,
        context: Context,
        superview: Option<ViewId>,
    ) {
        trace!(view = ?id, "adding view {:?}", view);
        let context = context.for_node(id);
        let mut state = view.new_state(&context);
        state.did_change_dependencies(&context);

        self.nodes.insert(
            id,
            TreeNode {
                view: Arc::clone(view),
                superview,
                state,
                subviews: Vec::new(),
                context,
            },
        );
    }

    /// Removes a view and its subviews.
    ///
    /// Does *not* remove the view from the superview’s `subviews` list. The view must exist.
    fn remove_view(&mut self, id: ViewId) {
        let mut node = self.nodes.remove(&id).expect("removing nonexistent view");
        trace!(view = ?id, "removing view");
        node.state.will_unmount(&node.context);
        for subview in node.subviews {
            self.remove_view(subview);
        }
    }

    /// Replaces a view with another of a different type.
    ///
    /// The view must exist.
    fn replace_view(&mut self, id: ViewId, view: &Arc<dyn View>, context: Context) {
        let superview = self
            .nodes
            .get(&id)
            .expect("replacing nonexistent view")
            .superview;
        self.remove_view(id);
        self.add_view(id, view, context, superview);
    }

    /// Updates an existing view with new properties, which must be of the same type.
    fn update_view(&mut self, id: ViewId, view: &Arc<dyn View>) {
        let node = self.nodes.get_mut(&id).expect("updating nonexistent view");
        debug_assert!(
            node.view.as_any().type_id() == view.as_any().type_id(),
            "update_view called with incorrect type"
        );
        node.state.will_update(&**view, &node.context);
        node.view = Arc::clone(view);
    }

    /// Hands a retained view the context its ancestors now provide.
    fn update_dependencies(&mut self, id: ViewId, context: Context) {
        let node = self.nodes.get_mut(&id).expect("updating nonexistent view");
        trace!(view = ?id, "dependencies changed");
        node.context = context.for_node(id);
        node.state.did_change_dependencies(&node.context);
    }

    /// Renders the node’s body and diffs it against its subviews.
    fn render_body(&mut self, id: ViewId) {
        let node = &self.nodes[&id];
        let body = node.view.body(node.state.as_any(), &node.context);
        let subview_context = node
            .view
            .subview_context(node.state.as_any(), &node.context)
            .unwrap_or_else(|| node.context.clone());
        self.rendered.insert(id);
        self.diff_subviews(id, body, subview_context);
    }

    /// Diffs the subview/the subviews of a node.
    fn diff_subviews(&mut self, superview: ViewId, subview: Arc<dyn View>, context: Context) {
        let mut single_subview_storage = Vec::with_capacity(1);
        let subviews = match subview.as_any().downcast_ref::<Fragment>() {
            Some(subviews) => subviews, // list of subviews
            None => match subview.as_any().downcast_ref::<()>() {
                Some(()) => &single_subview_storage, // no subviews at all
                None => {
                    // single subview
                    single_subview_storage.push(Arc::clone(&subview));
                    &single_subview_storage
                }
            },
        };

        // To identify which existing subview and newly rendered subview are meant to be the same,
        // each subview has a key.

        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        enum Key {
            /// A user-specified key.
            Key(u64),
            /// An automatically assigned key.
            AutoKey(u64),
        }

        // If a subview doesn’t have a user-specified key, it’ll be auto-keyed sequentially by
        // index ignoring user-keyed items, e.g.
        //
        // array     [A, B, C(key=1), D(key=2), E]
        // auto-key   0  1                      2

        let mut auto_key_counter = 0;
        let mut current_subviews_by_key = HashMap::new();
        for id in &self.nodes[&superview].subviews {
            let key = self.nodes[id].view.key().map(Key::Key).unwrap_or_else(|| {
                let k = auto_key_counter;
                auto_key_counter += 1;
                Key::AutoKey(k)
            });
            current_subviews_by_key.insert(key, *id);
        }

        let mut auto_key_counter = 0;
        let mut new_subviews = Vec::with_capacity(subviews.len());

        for view in subviews.iter() {
            let key = view.key().map(Key::Key).unwrap_or_else(|| {
                let k = auto_key_counter;
                auto_key_counter += 1;
                Key::AutoKey(k)
            });

            // reuse the old subview with the same key, or create a new one
            let subview_id = current_subviews_by_key
                .remove(&key)
                .unwrap_or_else(ViewId::new);
            self.diff(subview_id, view, context.clone(), Some(superview));
            new_subviews.push(subview_id);
        }

        // unused subviews need to be removed
        for (_, id) in current_subviews_by_key {
            self.remove_view(id);
        }

        if let Some(node) = self.nodes.get_mut(&superview) {
            node.subviews = new_subviews;
        }
    }
}
