//! Multi-turn conversations.
//!
//! A [`Conversation`] is an async closure that talks to the user through
//! [`Turns`]: [`Turns::ask`] sends a reply and suspends until the user's
//! next message arrives, [`Turns::say`] sends without waiting. The value the
//! closure returns is the conversation's final reply.
//!
//! ```rust,ignore
//! fn survey() -> Conversation {
//!     Conversation::new(|mut turns: Turns| async move {
//!         let name = turns.ask("What is your name?").await?;
//!         let age = turns.ask(Answer::new("How old are you?")).await?;
//!         Ok::<_, ConversationCancelled>(format!("{name} is {age}"))
//!     })
//! }
//! ```
//!
//! Each started conversation runs as its own task. One channel carries the
//! user's input into the task and another carries the produced steps out.
//! Dropping the [`ConversationHandle`] cancels the conversation: its pending
//! `ask` returns [`ConversationCancelled`] and whatever it produces
//! afterwards is discarded.

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::answer::{IntoReply, Reply};
use crate::context::Context;
use crate::error::{ConversationCancelled, Error};
use crate::handler::{HandlerResult, panic_message};

type Body = Box<dyn FnOnce(Turns) -> BoxFuture<'static, HandlerResult> + Send>;

/// A multi-turn handler that has not been started yet.
pub struct Conversation {
    body: Body,
}

impl Conversation {
    /// Wraps the conversation closure.
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: FnOnce(Turns) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        Self {
            body: Box::new(move |turns| {
                async move { f(turns).await.into_reply() }.boxed()
            }),
        }
    }

    /// Spawns the conversation task with `ctx` as its first context.
    pub(crate) fn start(self, ctx: Context) -> ConversationHandle {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (step_tx, step_rx) = mpsc::unbounded_channel();

        let turns = Turns {
            ctx,
            input: input_rx,
            steps: step_tx.clone(),
        };
        let body = self.body;
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(body(turns)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(Error::HandlerFault {
                    message: format!("conversation panicked: {}", panic_message(&*panic)),
                    location: None,
                }),
            };
            // The receiver is gone if the conversation was cancelled.
            let _ = step_tx.send(Step::Finished(result));
        });

        ConversationHandle {
            input: input_tx,
            steps: step_rx,
        }
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation").finish_non_exhaustive()
    }
}

/// What a running conversation produced.
#[derive(Debug)]
pub(crate) enum Step {
    /// A reply to deliver; the conversation keeps running.
    Say(HandlerResult),
    /// A reply to deliver; the conversation now waits for input.
    Ask(HandlerResult),
    /// The final reply; the conversation is over.
    Finished(HandlerResult),
}

/// The conversation's side of the dialogue.
pub struct Turns {
    ctx: Context,
    input: mpsc::UnboundedReceiver<Context>,
    steps: mpsc::UnboundedSender<Step>,
}

impl Turns {
    /// The context of the update the conversation was last resumed with.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Sends `reply` and waits for the user's next message (or the data of
    /// a picked query option).
    pub async fn ask(&mut self, reply: impl IntoReply) -> Result<String, ConversationCancelled> {
        self.steps
            .send(Step::Ask(reply.into_reply()))
            .map_err(|_| ConversationCancelled)?;
        let ctx = self.input.recv().await.ok_or(ConversationCancelled)?;
        let text = ctx.text().to_string();
        self.ctx = ctx;
        Ok(text)
    }

    /// Sends `reply` without waiting for an answer.
    pub fn say(&self, reply: impl IntoReply) -> Result<(), ConversationCancelled> {
        self.steps
            .send(Step::Say(reply.into_reply()))
            .map_err(|_| ConversationCancelled)
    }
}

impl fmt::Debug for Turns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Turns")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

/// The engine's side of a running conversation.
pub struct ConversationHandle {
    input: mpsc::UnboundedSender<Context>,
    steps: mpsc::UnboundedReceiver<Step>,
}

impl ConversationHandle {
    /// Feeds the user's input into the suspended conversation.
    pub(crate) fn resume(&self, ctx: Context) -> bool {
        self.input.send(ctx).is_ok()
    }

    /// Waits for the next step.
    ///
    /// A task that vanished without finishing is reported as a fault.
    pub(crate) async fn next_step(&mut self) -> Step {
        match self.steps.recv().await {
            Some(step) => step,
            None => Step::Finished(Err(Error::fault("conversation ended unexpectedly"))),
        }
    }
}

impl fmt::Debug for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationHandle")
            .field("closed", &self.input.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio_test::{assert_pending, task};

    use super::*;
    use crate::answer::Body as AnswerBody;
    use crate::testing;

    fn text_of(step: Step) -> String {
        let reply = match step {
            Step::Say(reply) | Step::Ask(reply) | Step::Finished(reply) => reply.unwrap(),
        };
        match reply {
            Reply::Answers(answers) => match &answers[0].body {
                AnswerBody::Text { key, .. } => key.clone(),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    fn greeter() -> Conversation {
        Conversation::new(|mut turns: Turns| async move {
            turns.say("Welcome")?;
            let name = turns.ask("Name?").await?;
            Ok::<_, ConversationCancelled>(format!("Hello {name}"))
        })
    }

    #[tokio::test]
    async fn steps_flow_through_the_channels() {
        let mut handle = greeter().start(testing::context("/start"));

        let step = handle.next_step().await;
        assert!(matches!(step, Step::Say(_)));
        assert_eq!(text_of(step), "Welcome");

        let step = handle.next_step().await;
        assert!(matches!(step, Step::Ask(_)));
        assert_eq!(text_of(step), "Name?");

        assert!(handle.resume(testing::context("Ada")));
        let step = handle.next_step().await;
        assert!(matches!(step, Step::Finished(_)));
        assert_eq!(text_of(step), "Hello Ada");
    }

    #[tokio::test]
    async fn suspended_conversation_waits_for_input() {
        let mut handle = greeter().start(testing::context("/start"));
        handle.next_step().await;
        handle.next_step().await;

        let mut next = task::spawn(handle.next_step());
        assert_pending!(next.poll());
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_pending_ask() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let flag = cancelled.clone();
        let conversation = Conversation::new(move |mut turns: Turns| async move {
            if turns.ask("Waiting").await == Err(ConversationCancelled) {
                flag.store(true, Ordering::SeqCst);
            }
            let _ = done_tx.send(());
        });

        let mut handle = conversation.start(testing::context("go"));
        handle.next_step().await;
        drop(handle);

        done_rx.await.unwrap();
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panics_finish_with_a_fault() {
        let conversation = Conversation::new(|_turns: Turns| async move {
            if true {
                panic!("lost the thread");
            }
        });
        let mut handle = conversation.start(testing::context("go"));
        match handle.next_step().await {
            Step::Finished(Err(Error::HandlerFault { message, .. })) => {
                assert!(message.contains("lost the thread"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
