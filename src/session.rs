//! Ownership of one open codec context and its stream.

use crate::codecs::DecoderContext;
use crate::error::CodecError;

/// Owns a decoder context and the stream it reads from.
///
/// [`release`](Self::release) frees both exactly once; later calls do
/// nothing. Dropping an unreleased resource releases it. When `S` is a
/// `&mut` borrow, releasing ends the borrow and the caller keeps the stream.
pub(crate) struct SessionResource<S> {
    stream: Option<S>,
    context: Option<Box<dyn DecoderContext>>,
}

impl<S> SessionResource<S> {
    pub(crate) fn new(stream: S, context: Box<dyn DecoderContext>) -> Self {
        Self {
            stream: Some(stream),
            context: Some(context),
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.context.is_none()
    }

    pub(crate) fn context(&self) -> Result<&dyn DecoderContext, CodecError> {
        self.context.as_deref().ok_or(CodecError::UseAfterClose)
    }

    /// Stream and context, borrowed together for one decode call.
    pub(crate) fn parts(
        &mut self,
    ) -> Result<(&mut S, &mut (dyn DecoderContext + 'static)), CodecError> {
        match (self.stream.as_mut(), self.context.as_deref_mut()) {
            (Some(stream), Some(context)) => Ok((stream, context)),
            _ => Err(CodecError::UseAfterClose),
        }
    }

    /// Release the codec context and hand back the stream.
    pub(crate) fn take_stream(&mut self) -> Option<S> {
        self.release_context();
        self.stream.take()
    }

    pub(crate) fn release(&mut self) {
        self.release_context();
        self.stream = None;
    }

    fn release_context(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.release();
            log::trace!("session: codec context released");
        }
    }
}

impl<S> Drop for SessionResource<S> {
    fn drop(&mut self) {
        self.release();
    }
}
