use typed_builder::TypedBuilder;

/// Operator facing settings of the dispatch layer.
#[derive(Clone, Debug, TypedBuilder)]
pub struct DispatchConfig {
    /// Registry name of the message processing policy.
    #[builder(default = String::from("max"), setter(into))]
    pub policy: String,
    /// OOB batches larger than this are delivered message by message by the
    /// `unbatch` policy. 0 disables splitting.
    #[builder(default)]
    pub max_size: usize,
    /// Cap on units queued per sender by the `max` and `unbatch` policies.
    /// 0 means unbounded.
    #[builder(default)]
    pub max_buffer_size: usize,
    /// Tasks the tokio pool admits at once.
    #[builder(default = 200)]
    pub pool_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
