//! The (provider, operation) -> queue routing table. Fixed at build time:
//! no runtime configuration changes which queue a job lands on.

use crate::job::{Operation, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Default,
    TripoOther,
    TripoRefine,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Default => "default",
            QueueName::TripoOther => "tripo_other",
            QueueName::TripoRefine => "tripo_refine",
        }
    }

    pub fn all() -> [QueueName; 3] {
        [QueueName::Default, QueueName::TripoOther, QueueName::TripoRefine]
    }
}

/// Routing is keyed on `(provider, operation)` rather than on `kind` alone:
/// Stability's 3D path is synchronous and cheap enough to share the
/// `default` queue with image jobs, while every Tripo operation needs its
/// own dedicated, low-concurrency queue.
pub fn queue_for(provider: Provider, operation: Operation) -> QueueName {
    match provider {
        Provider::Tripo => match operation {
            Operation::RefineModel => QueueName::TripoRefine,
            _ => QueueName::TripoOther,
        },
        _ => QueueName::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tripo_refine_gets_its_own_queue() {
        assert_eq!(
            queue_for(Provider::Tripo, Operation::RefineModel),
            QueueName::TripoRefine
        );
    }

    #[test]
    fn tripo_text_and_image_to_model_share_tripo_other() {
        assert_eq!(queue_for(Provider::Tripo, Operation::TextToModel), QueueName::TripoOther);
        assert_eq!(queue_for(Provider::Tripo, Operation::ImageToModel), QueueName::TripoOther);
    }

    #[test]
    fn stability_model_jobs_use_default_queue() {
        assert_eq!(queue_for(Provider::Stability, Operation::ImageToModel), QueueName::Default);
    }

    #[test]
    fn routing_is_immutable_given_the_same_pair() {
        for _ in 0..3 {
            assert_eq!(queue_for(Provider::Flux, Operation::ImageToImage), QueueName::Default);
        }
    }
}
