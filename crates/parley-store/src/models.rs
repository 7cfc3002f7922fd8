/// Database row types. These map directly to SQLite rows and stay
/// independent of the JSON snapshot types handed to callers.

pub struct NodeRow {
    /// Path of the collection holding this node, `""` at the top level.
    pub parent: String,
    pub key: String,
    pub value: String,
}
