//! Maps policy names, as found in configuration, to constructors.

use std::sync::Arc;

use super::{
    config::DispatchConfig,
    direct::{PassAllMessagesUpDirectly, PassRegularMessagesUpDirectly},
    error::{DispatchError, DispatchResult},
    max_one::MaxOneThreadPerSender,
    policy::MessageProcessingPolicy,
    submit::SubmitToThreadPool,
    transport::Transport,
    unbatch::UnbatchOOBBatches,
};

type Constructor =
    fn(Arc<Transport>, &DispatchConfig) -> Arc<dyn MessageProcessingPolicy>;

const POLICIES: &[(&str, Constructor)] = &[
    ("submit", submit),
    ("max", max_one),
    ("direct", direct),
    ("direct-regular", direct_regular),
    ("unbatch", unbatch),
];

fn submit(
    transport: Arc<Transport>,
    _: &DispatchConfig,
) -> Arc<dyn MessageProcessingPolicy> {
    Arc::new(SubmitToThreadPool::new(transport))
}

fn max_one(
    transport: Arc<Transport>,
    config: &DispatchConfig,
) -> Arc<dyn MessageProcessingPolicy> {
    Arc::new(MaxOneThreadPerSender::new(transport, config.max_buffer_size))
}

fn direct(
    transport: Arc<Transport>,
    _: &DispatchConfig,
) -> Arc<dyn MessageProcessingPolicy> {
    Arc::new(PassAllMessagesUpDirectly::new(transport))
}

fn direct_regular(
    transport: Arc<Transport>,
    _: &DispatchConfig,
) -> Arc<dyn MessageProcessingPolicy> {
    Arc::new(PassRegularMessagesUpDirectly::new(transport))
}

fn unbatch(
    transport: Arc<Transport>,
    config: &DispatchConfig,
) -> Arc<dyn MessageProcessingPolicy> {
    Arc::new(UnbatchOOBBatches::new(
        transport,
        config.max_size,
        config.max_buffer_size,
    ))
}

/// Builds the policy registered as `name`.
pub fn create(
    name: &str,
    transport: Arc<Transport>,
    config: &DispatchConfig,
) -> DispatchResult<Arc<dyn MessageProcessingPolicy>> {
    POLICIES
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, constructor)| constructor(transport, config))
        .ok_or_else(|| DispatchError::UnknownPolicy(name.to_owned()))
}

/// Builds the policy named by `config.policy`.
pub fn from_config(
    transport: Arc<Transport>,
    config: &DispatchConfig,
) -> DispatchResult<Arc<dyn MessageProcessingPolicy>> {
    create(&config.policy, transport, config)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    POLICIES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::dispatch::testing::{transport, InlinePool};

    #[test]
    fn every_name_builds_its_policy() {
        let (transport, _) = transport(InlinePool::new());
        let config = DispatchConfig::default();

        for name in names() {
            let policy = create(name, transport.clone(), &config).unwrap();
            assert!(policy.name() == name);
        }
        assert!(names().count() == 5);
    }

    #[test]
    fn unknown_name() {
        let (transport, _) = transport(InlinePool::new());
        let result = create("fifo", transport, &DispatchConfig::default());

        assert!(matches!(
            result,
            Err(DispatchError::UnknownPolicy(name)) if name == "fifo"
        ));
    }

    #[test]
    fn config_picks_policy() {
        let (transport, _) = transport(InlinePool::new());
        let config = DispatchConfig::builder()
            .policy("unbatch")
            .max_size(3)
            .build();

        assert!(from_config(transport, &config).unwrap().name() == "unbatch");
    }
}
