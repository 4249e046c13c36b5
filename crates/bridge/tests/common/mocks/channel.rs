use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use cosim_bridge::common::Tick;
use cosim_bridge::transport::{Exchange, Message, TransportError};
use mockall::mock;

/// Simulated time shared between a [`RecordingSimulator`](super::simulator::RecordingSimulator)
/// and a [`ScriptedChannel`], so the channel can note when each receive happened.
pub type Clock = Rc<Cell<Tick>>;

// `MockChannel`, for asserting on timeouts and call counts.
mock! {
    pub Channel {}

    impl Exchange for Channel {
        fn send(&mut self, message: &Message) -> Result<(), TransportError>;
        fn receive(&mut self, timeout: Option<Duration>) -> Result<Message, TransportError>;
    }
}

/// What a scripted receive yields.
pub enum Incoming {
    /// Deliver a message.
    Message(Message),
    /// Fail with this error.
    Error(TransportError),
}

/// Shared state of a [`ScriptedChannel`], readable after the channel moved into a scheduler.
#[derive(Default)]
pub struct Transcript {
    /// Messages the scheduler sent, in order.
    pub sent: Vec<Message>,
    /// Clock value at each receive.
    pub receive_ticks: Vec<Tick>,
    /// Timeout passed to each receive.
    pub timeouts: Vec<Option<Duration>>,
}

/// Channel replaying a fixed script of incoming messages.
///
/// Once the script is exhausted every receive fails with `Disconnected`.
pub struct ScriptedChannel {
    script: VecDeque<Incoming>,
    clock: Clock,
    transcript: Rc<RefCell<Transcript>>,
}

impl ScriptedChannel {
    pub fn new(messages: impl IntoIterator<Item = Message>, clock: Clock) -> Self {
        Self::with_script(messages.into_iter().map(Incoming::Message), clock)
    }

    pub fn with_script(script: impl IntoIterator<Item = Incoming>, clock: Clock) -> Self {
        Self {
            script: script.into_iter().collect(),
            clock,
            transcript: Rc::default(),
        }
    }

    /// Handle to the transcript that stays valid after the channel is moved.
    pub fn transcript(&self) -> Rc<RefCell<Transcript>> {
        Rc::clone(&self.transcript)
    }
}

impl Exchange for ScriptedChannel {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        self.transcript.borrow_mut().sent.push(message.clone());
        Ok(())
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Message, TransportError> {
        {
            let mut transcript = self.transcript.borrow_mut();
            transcript.receive_ticks.push(self.clock.get());
            transcript.timeouts.push(timeout);
        }
        match self.script.pop_front() {
            Some(Incoming::Message(message)) => Ok(message),
            Some(Incoming::Error(e)) => Err(e),
            None => Err(TransportError::Disconnected),
        }
    }
}
