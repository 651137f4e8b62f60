//! Flare task handlers and the task dispatch table.

use crate::error::ServerError;
use crate::session::Session;
use flare_protocol::{DispatchTable, FlareHeader, FlareMessage, FlareOpcode, Message, OpenVideo};

/// A message produced by a task handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Sent to the peer as a binary frame.
    Flare(FlareMessage),
    /// Sent to the peer as-is.
    Transport(Message),
}

/// Handles one kind of Flare message.
pub trait TaskHandler: Send + Sync {
    fn handle(
        &self,
        message: FlareMessage,
        session: &mut Session,
    ) -> Result<Vec<Reply>, ServerError>;
}

/// Answers OPEN_VIDEO with the session's current video.
pub struct OpenVideoTask;

impl TaskHandler for OpenVideoTask {
    fn handle(
        &self,
        message: FlareMessage,
        session: &mut Session,
    ) -> Result<Vec<Reply>, ServerError> {
        let FlareMessage::OpenVideo(request) = message;
        let reply = match session.video().current() {
            Some(info) => OpenVideo::Available(info),
            None => OpenVideo::Unavailable,
        };

        tracing::debug!(
            "[{}] OPEN_VIDEO (requested available={}) -> available={}",
            session.id,
            request.is_available(),
            reply.is_available()
        );

        Ok(vec![Reply::Flare(FlareMessage::OpenVideo(reply))])
    }
}

/// Application opcode → task handler table.
pub struct TaskTable {
    table: DispatchTable<dyn TaskHandler>,
}

impl TaskTable {
    /// Builds the table of supported application opcodes.
    pub fn standard() -> Result<Self, ServerError> {
        let table = DispatchTable::<dyn TaskHandler>::builder()
            .register(FlareOpcode::OPEN_VIDEO, open_video_task)?
            .build();
        Ok(Self { table })
    }

    /// Wraps an already built table.
    pub fn from_table(table: DispatchTable<dyn TaskHandler>) -> Self {
        Self { table }
    }

    /// Returns whether a handler is registered for `opcode`.
    pub fn contains(&self, opcode: u8) -> bool {
        self.table.contains(opcode)
    }

    /// Returns the registered opcodes.
    pub fn opcodes(&self) -> Vec<u8> {
        self.table.opcodes()
    }

    /// Resolves the handler for `opcode`.
    pub fn resolve(&self, opcode: u8) -> Result<Box<dyn TaskHandler>, ServerError> {
        self.table
            .resolve(opcode)
            .ok_or(ServerError::UnsupportedMessage { opcode })
    }

    /// Routes a decoded message to its handler.
    pub fn dispatch(
        &self,
        session: &mut Session,
        message: FlareMessage,
    ) -> Result<Vec<Reply>, ServerError> {
        let opcode = message.opcode();
        let handler = self.resolve(opcode.as_u8())?;

        session.record_dispatch();
        tracing::debug!("[{}] Dispatching {}", session.id, opcode.name());

        handler.handle(message, session)
    }

    /// Decodes a binary frame payload and routes it.
    ///
    /// The opcode is looked up before the payload is decoded, so an
    /// unregistered opcode is reported as a dispatch miss.
    pub fn dispatch_bytes(
        &self,
        session: &mut Session,
        bytes: &[u8],
    ) -> Result<Vec<Reply>, ServerError> {
        let header = FlareHeader::read(bytes)?;
        if !self.contains(header.opcode) {
            return Err(ServerError::UnsupportedMessage {
                opcode: header.opcode,
            });
        }
        let message = FlareMessage::decode(bytes)?;
        self.dispatch(session, message)
    }
}

impl std::fmt::Debug for TaskTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTable")
            .field("opcodes", &self.opcodes())
            .finish()
    }
}

fn open_video_task() -> Box<dyn TaskHandler> {
    Box::new(OpenVideoTask)
}
