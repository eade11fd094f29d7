use async_trait::async_trait;
use shared::domain::{KittyId, KittyRecord};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Chosen(KittyId),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationDecision {
    Create { genes: Option<u64> },
    Decline,
}

#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn select_target(&self, candidates: &[KittyRecord]) -> Selection;

    async fn offer_creation(&self) -> CreationDecision;
}

pub struct NoDecisions;

#[async_trait]
impl DecisionMaker for NoDecisions {
    async fn select_target(&self, _candidates: &[KittyRecord]) -> Selection {
        Selection::Cancelled
    }

    async fn offer_creation(&self) -> CreationDecision {
        CreationDecision::Decline
    }
}

#[derive(Debug)]
pub enum DecisionPrompt {
    SelectTarget {
        candidates: Vec<KittyRecord>,
        reply: oneshot::Sender<Selection>,
    },
    OfferCreation {
        reply: oneshot::Sender<CreationDecision>,
    },
}

#[derive(Clone)]
pub struct ChannelDecisionMaker {
    prompts: mpsc::Sender<DecisionPrompt>,
}

impl ChannelDecisionMaker {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<DecisionPrompt>) {
        let (prompts, rx) = mpsc::channel(buffer);
        (Self { prompts }, rx)
    }
}

#[async_trait]
impl DecisionMaker for ChannelDecisionMaker {
    async fn select_target(&self, candidates: &[KittyRecord]) -> Selection {
        let (reply, answer) = oneshot::channel();
        let prompt = DecisionPrompt::SelectTarget {
            candidates: candidates.to_vec(),
            reply,
        };
        if self.prompts.send(prompt).await.is_err() {
            return Selection::Cancelled;
        }
        answer.await.unwrap_or(Selection::Cancelled)
    }

    async fn offer_creation(&self) -> CreationDecision {
        let (reply, answer) = oneshot::channel();
        if self
            .prompts
            .send(DecisionPrompt::OfferCreation { reply })
            .await
            .is_err()
        {
            return CreationDecision::Decline;
        }
        answer.await.unwrap_or(CreationDecision::Decline)
    }
}

#[cfg(test)]
#[path = "tests/decision_tests.rs"]
mod tests;
