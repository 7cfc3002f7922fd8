/// Shared Parley types.
///
/// `models` holds the domain values the chat core works with; `api` holds the
/// JSON shapes exchanged with the realtime store and the media host.
pub mod api;
pub mod models;
