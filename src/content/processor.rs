//! Processor abstraction over operator streams.
//!
//! A processor consumes typed operators; the interpreter feeds it from
//! the content parser under the lenient error policy. Built-in
//! processors: the run processor (drives a device; see `interpreter`),
//! the buffer processor (serializes the stream back out), and the filter
//! processor (rewrites a stream while passing operators through a
//! predicate).

use super::operators::Op;
use super::parser::ContentParser;
use crate::cookie::Cookie;
use crate::error::Result;

/// Consumes one operator at a time.
pub trait Processor {
    /// Handle one operator.
    fn process_op(&mut self, op: Op) -> Result<()>;

    /// Called once after the last operator.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Feed a content stream through a processor with the standard policy:
/// per-operator errors are logged and counted, abort/io propagate.
pub fn process_stream(
    content: &[u8],
    processor: &mut dyn Processor,
    cookie: Option<&Cookie>,
    strict: bool,
) -> Result<()> {
    let mut parser = ContentParser::new(content);
    let mut logged = false;
    loop {
        if let Some(cookie) = cookie {
            cookie.check()?;
        }
        match parser.next_op() {
            Ok(Some(op)) => {
                if let Some(cookie) = cookie {
                    cookie.tick();
                }
                match processor.process_op(op) {
                    Ok(()) => {},
                    Err(e) if strict || e.is_fatal() => return Err(e),
                    Err(e) => {
                        if let Some(cookie) = cookie {
                            cookie.count_error();
                        }
                        if !logged {
                            log::warn!("content stream error (continuing): {e}");
                            logged = true;
                        }
                    },
                }
            },
            Ok(None) => break,
            Err(e) if strict || e.is_fatal() => return Err(e),
            Err(e) => {
                if let Some(cookie) = cookie {
                    cookie.count_error();
                }
                if !logged {
                    log::warn!("content stream parse error (continuing): {e}");
                    logged = true;
                }
            },
        }
    }
    processor.finish()
}

/// Serializes operators back to content-stream bytes.
#[derive(Debug, Default)]
pub struct BufferProcessor {
    /// The serialized stream
    pub out: Vec<u8>,
}

impl BufferProcessor {
    /// A fresh buffer processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the serialized bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

impl Processor for BufferProcessor {
    fn process_op(&mut self, op: Op) -> Result<()> {
        op.write(&mut self.out);
        Ok(())
    }
}

/// Rewrites a stream: operators the predicate rejects are dropped, the
/// rest pass through to the inner processor.
pub struct FilterProcessor<'a> {
    inner: &'a mut dyn Processor,
    keep: Box<dyn FnMut(&Op) -> bool + 'a>,
}

impl<'a> FilterProcessor<'a> {
    /// Wrap `inner`, keeping only operators `keep` approves.
    pub fn new(inner: &'a mut dyn Processor, keep: impl FnMut(&Op) -> bool + 'a) -> Self {
        Self {
            inner,
            keep: Box::new(keep),
        }
    }
}

impl Processor for FilterProcessor<'_> {
    fn process_op(&mut self, op: Op) -> Result<()> {
        if (self.keep)(&op) {
            self.inner.process_op(op)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects operators for assertions.
    #[derive(Default)]
    struct CollectProcessor {
        ops: Vec<Op>,
    }

    impl Processor for CollectProcessor {
        fn process_op(&mut self, op: Op) -> Result<()> {
            self.ops.push(op);
            Ok(())
        }
    }

    #[test]
    fn test_buffer_round_trip_produces_same_ops() {
        let source = b"q 1 0 0 rg 0 0 100 100 re f Q";
        let mut buffer = BufferProcessor::new();
        process_stream(source, &mut buffer, None, true).unwrap();
        let rewritten = buffer.into_bytes();

        let mut direct = CollectProcessor::default();
        process_stream(source, &mut direct, None, true).unwrap();
        let mut via_buffer = CollectProcessor::default();
        process_stream(&rewritten, &mut via_buffer, None, true).unwrap();

        assert_eq!(direct.ops, via_buffer.ops);
    }

    #[test]
    fn test_filter_drops_rejected_ops() {
        let source = b"q 0 0 5 5 re f BT ET Q";
        let mut collect = CollectProcessor::default();
        {
            let mut filter = FilterProcessor::new(&mut collect, |op| {
                !matches!(op, Op::BeginText | Op::EndText)
            });
            process_stream(source, &mut filter, None, true).unwrap();
        }
        assert!(!collect.ops.iter().any(|op| matches!(op, Op::BeginText)));
        assert_eq!(collect.ops.len(), 4);
    }

    #[test]
    fn test_lenient_mode_swallows_errors() {
        // Bad operator in the middle; lenient mode keeps going
        let source = b"1 0 cm 0 0 5 5 re f";
        let mut collect = CollectProcessor::default();
        process_stream(source, &mut collect, None, false).unwrap();
        assert_eq!(collect.ops.len(), 2);
    }

    #[test]
    fn test_strict_mode_propagates() {
        let source = b"1 0 cm";
        let mut collect = CollectProcessor::default();
        assert!(process_stream(source, &mut collect, None, true).is_err());
    }

    #[test]
    fn test_abort_cookie_stops_stream() {
        let cookie = Cookie::new();
        cookie.set_abort();
        let mut collect = CollectProcessor::default();
        let err = process_stream(b"q Q", &mut collect, Some(&cookie), false).unwrap_err();
        assert!(matches!(err, crate::error::Error::Abort));
    }
}
