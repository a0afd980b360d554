use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MASK: &str = "***HIDDEN***";

/// Install the global subscriber. Every formatted line passes through
/// [`RedactingMakeWriter`] so the given values never reach stdout.
pub fn init(secrets: Vec<String>) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,postrelay=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(RedactingMakeWriter::new(io::stdout, secrets)),
        )
        .init();
}

/// Replace every occurrence of each secret with a fixed mask.
pub fn redact<'a>(text: &'a str, secrets: &[String]) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(text);
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        if out.contains(secret.as_str()) {
            out = Cow::Owned(out.replace(secret.as_str(), MASK));
        }
    }
    out
}

#[derive(Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    secrets: Arc<[String]>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, secrets: Vec<String>) -> Self {
        Self {
            inner,
            secrets: secrets.into(),
        }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for RedactingMakeWriter<M> {
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            secrets: Arc::clone(&self.secrets),
        }
    }
}

pub struct RedactingWriter<W> {
    inner: W,
    secrets: Arc<[String]>,
}

impl<W: Write> Write for RedactingWriter<W> {
    // The fmt layer hands over one whole formatted event per call, so a
    // secret is never split across two writes.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let redacted = redact(&text, &self.secrets);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
