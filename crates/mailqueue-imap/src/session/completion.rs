//! The future each facade call returns.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::sync::oneshot;

use crate::engine::Reply;
use crate::{Error, Result};

/// Result of one submitted operation.
///
/// The operation is queued when the facade method returns, not when this is
/// first polled, so submission order is call order. Dropping a `Completion`
/// does not cancel the operation; its result is discarded.
#[must_use = "the operation runs either way; await the completion to see its result"]
#[derive(Debug)]
pub struct Completion<T> {
    state: State<T>,
}

#[derive(Debug)]
enum State<T> {
    Pending {
        rx: oneshot::Receiver<Result<Reply>>,
        extract: fn(Reply) -> Result<T>,
    },
    /// Rejected before submission.
    Failed(Option<Error>),
}

impl<T> Completion<T> {
    pub(crate) const fn pending(
        rx: oneshot::Receiver<Result<Reply>>,
        extract: fn(Reply) -> Result<T>,
    ) -> Self {
        Self {
            state: State::Pending { rx, extract },
        }
    }

    pub(crate) const fn failed(error: Error) -> Self {
        Self {
            state: State::Failed(Some(error)),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Pending { rx, extract } => {
                let extract = *extract;
                let received = ready!(Pin::new(rx).poll(cx));
                this.state = State::Failed(None);
                Poll::Ready(match received {
                    Ok(reply) => reply.and_then(extract),
                    Err(_) => Err(Error::SessionClosed),
                })
            }
            // A second poll after completion also lands here.
            State::Failed(error) => Poll::Ready(Err(error.take().unwrap_or(Error::SessionClosed))),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::error::StateError;

    fn text(reply: Reply) -> Result<String> {
        Ok(reply.text)
    }

    #[tokio::test]
    async fn test_resolves_through_extractor() {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::pending(rx, text);
        tx.send(Ok(Reply {
            text: "SELECT completed".into(),
            ..Reply::default()
        }))
        .unwrap();
        assert_eq!(completion.await.unwrap(), "SELECT completed");
    }

    #[tokio::test]
    async fn test_engine_error_passes_through() {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::pending(rx, text);
        tx.send(Err(StateError::NotAuthenticated.into())).unwrap();
        let err = completion.await.unwrap_err();
        assert_eq!(err.kind().to_string(), "state_error");
    }

    #[tokio::test]
    async fn test_dropped_sender_is_session_closed() {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::pending(rx, text);
        drop(tx);
        assert!(matches!(completion.await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_failed_before_submission() {
        let completion: Completion<String> =
            Completion::failed(Error::Validation("empty password".into()));
        assert!(matches!(completion.await, Err(Error::Validation(_))));
    }
}
