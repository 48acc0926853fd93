//! Blocking turn driver.

use ragstream_core::error::{Error, Result};
use ragstream_core::message::Message;
use ragstream_core::provider::BlockingChunks;

use crate::agent::RagAgent;
use crate::turn::{Step, TurnMachine};

enum State<'a> {
    /// Nothing has run yet.
    Init,
    /// Ready to issue the request for the current phase.
    Request(TurnMachine<'a>),
    /// Pulling chunks of the current phase.
    Streaming(TurnMachine<'a>, BlockingChunks),
    /// Finished, successfully or not.
    Done,
}

/// A turn driven by pulling tokens; see [`RagAgent::iter_blocking`].
///
/// Each `next()` blocks until the transport produces the next token. After
/// the first error the iterator is exhausted.
pub struct BlockingTurn<'a> {
    agent: &'a RagAgent,
    messages: &'a mut Vec<Message>,
    state: State<'a>,
}

impl<'a> BlockingTurn<'a> {
    pub(crate) fn new(agent: &'a RagAgent, messages: &'a mut Vec<Message>) -> Self {
        Self {
            agent,
            messages,
            state: State::Init,
        }
    }
}

impl Iterator for BlockingTurn<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Init => match TurnMachine::begin(self.agent, self.messages) {
                    Ok(turn) => self.state = State::Request(turn),
                    Err(e) => return Some(Err(e)),
                },
                State::Request(turn) => {
                    let request = turn.request(self.messages);
                    match self.agent.provider.stream_blocking(request) {
                        Ok(chunks) => self.state = State::Streaming(turn, chunks),
                        Err(e) => return Some(Err(Error::provider(turn.phase(), e))),
                    }
                }
                State::Streaming(mut turn, mut chunks) => match chunks.next() {
                    Some(Ok(chunk)) => {
                        let token = turn.accept(chunk);
                        self.state = State::Streaming(turn, chunks);
                        if let Some(token) = token {
                            return Some(Ok(token));
                        }
                    }
                    Some(Err(e)) => return Some(Err(Error::provider(turn.phase(), e))),
                    None => match turn.finish(self.messages) {
                        Ok(Step::Continue) => self.state = State::Request(turn),
                        Ok(Step::Done) => return None,
                        Err(e) => return Some(Err(e)),
                    },
                },
                State::Done => return None,
            }
        }
    }
}
