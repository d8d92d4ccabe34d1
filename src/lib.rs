//! View models for declarative views.
//!
//! # Conceptual overview
//! A view model owns an immutable snapshot of the data a view shows (the model) and the business
//! logic that produces new snapshots. The view observes the snapshot and renders again whenever
//! it is replaced by a different one.
//!
//! ## Models
//! A model is a plain value with structural equality (`PartialEq`). Models are never mutated in
//! place: the view model computes a new snapshot and hands it to
//! [`ViewModelCore::update_model`]. Handing over a snapshot equal to the current one does nothing
//! at all; in particular, the view does not render.
//!
//! ## View models
//! A [`ViewModel`] embeds a [`ViewModelCore`], which holds the snapshot in a [`ValueCell`] and a
//! [`RefreshChannel`] for the rare case where the view must render again without a new snapshot.
//! View models also receive the lifecycle of the view they are bound to: `init`,
//! `did_change_dependencies`, `did_update_props` and `dispose`.
//!
//! ## Views
//! A [`BoundView`] creates its view model and renders from it. Its host state is a
//! [`ViewBinding`], which follows the snapshot cell and the refresh channel and asks the host to
//! render again when either fires. Changes are delivered synchronously; renders are queued and
//! coalesced by the host.
//!
//! ## Testing
//! Any ancestor may provide a pre-built view model through the context (see [`Injected`]). Bound
//! views of the matching type then use it instead of creating their own, which is how
//! [`testing::test_view_model`] puts a view model under test without a second code path.
//!
//! ```text
//! #[derive(Debug, Clone, PartialEq)]
//! struct Count(u32);
//!
//! struct Counter {
//!     core: ViewModelCore<Count>,
//! }
//!
//! impl Counter {
//!     fn increment(&self) {
//!         let Count(n) = self.core.model();
//!         self.core.update_model(Count(n + 1));
//!     }
//! }
//!
//! impl ViewModel for Counter {
//!     type Model = Count;
//!     type Props = ();
//!
//!     fn core(&self) -> &ViewModelCore<Count> {
//!         &self.core
//!     }
//! }
//! ```

pub use yubikiri_host as host;

#[macro_use]
pub mod binding;
mod cell;
mod error;
mod refresh;
mod subscription;
pub mod testing;
mod view_model;

pub use binding::{BoundView, Injected, ModelOf, ViewBinding};
pub use cell::{ReadOnlyCell, ValueCell};
pub use error::{Error, Result};
pub use refresh::{RefreshChannel, RefreshListener};
pub use subscription::Subscription;
pub use view_model::{Phase, ViewModel, ViewModelCore};
