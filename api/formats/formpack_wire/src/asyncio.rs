// Copyright 2015-2023 Swim Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::scan::{measure_value, Measure};
use crate::{Reader, WireError, Writer};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

const INITIAL_CAPACITY: usize = 4096;

/// Suspending reader over an asynchronous byte transport. Bytes are pulled
/// into an internal buffer; token reads run against the buffered prefix and
/// the reader suspends, refilling the buffer, whenever a token is
/// incomplete. The buffer is forward-only: bytes are dropped as soon as a
/// read commits to them.
pub struct AsyncReader<'t> {
    transport: &'t mut (dyn AsyncRead + Send + Unpin),
    buffer: BytesMut,
    cancel: CancellationToken,
}

impl<'t> AsyncReader<'t> {
    pub fn new(transport: &'t mut (dyn AsyncRead + Send + Unpin), cancel: CancellationToken) -> Self {
        AsyncReader {
            transport,
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            cancel,
        }
    }

    /// Isolate the next complete structure into a contiguous buffer,
    /// advancing the cursor past it. The returned bytes can be decoded with
    /// a synchronous [`Reader`].
    pub async fn next_structure(&mut self) -> Result<Bytes, WireError> {
        loop {
            match measure_value(self.buffer.as_ref())? {
                Measure::Complete(len) => return Ok(self.buffer.split_to(len).freeze()),
                Measure::Incomplete => self.fill().await?,
            }
        }
    }

    /// Run a synchronous read against the buffered input, refilling and
    /// retrying from the same position whenever the buffered prefix is
    /// incomplete. The closure must consume only what it decodes; it may be
    /// invoked several times.
    pub async fn with_buffer<T, F>(&mut self, mut f: F) -> Result<T, WireError>
    where
        F: FnMut(&mut Reader<'_>) -> Result<T, WireError>,
    {
        loop {
            let total = self.buffer.len();
            let outcome = {
                let mut view: &[u8] = self.buffer.as_ref();
                let mut reader = Reader::new(&mut view);
                match f(&mut reader) {
                    Ok(value) => {
                        let unread = reader.pushback_len();
                        drop(reader);
                        Ok((value, total - view.len() - unread))
                    }
                    Err(e) => Err(e),
                }
            };
            match outcome {
                Ok((value, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(value);
                }
                Err(WireError::Incomplete) => self.fill().await?,
                Err(e) => return Err(e),
            }
        }
    }

    async fn fill(&mut self) -> Result<(), WireError> {
        if self.cancel.is_cancelled() {
            return Err(WireError::Cancelled);
        }
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(WireError::Cancelled),
            result = self.transport.read_buf(&mut self.buffer) => result?,
        };
        if read == 0 {
            Err(WireError::Incomplete)
        } else {
            Ok(())
        }
    }
}

/// Suspending writer over an asynchronous byte transport. Tokens are staged
/// into an internal buffer with a synchronous [`Writer`]; aggregate
/// converters flush the staged bytes to the transport once they exceed the
/// configured threshold.
pub struct AsyncWriter<'t> {
    transport: &'t mut (dyn AsyncWrite + Send + Unpin),
    buffer: BytesMut,
    cancel: CancellationToken,
}

impl<'t> AsyncWriter<'t> {
    pub fn new(
        transport: &'t mut (dyn AsyncWrite + Send + Unpin),
        cancel: CancellationToken,
    ) -> Self {
        AsyncWriter {
            transport,
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            cancel,
        }
    }

    /// A synchronous writer over the staging buffer.
    pub fn staging(&mut self) -> Writer<'_> {
        Writer::new(&mut self.buffer)
    }

    /// The number of staged bytes not yet handed to the transport.
    pub fn unflushed(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_time_to_flush(&self, threshold: usize) -> bool {
        self.buffer.len() >= threshold
    }

    /// Hand all staged bytes to the transport.
    pub async fn flush(&mut self) -> Result<(), WireError> {
        if self.cancel.is_cancelled() {
            return Err(WireError::Cancelled);
        }
        if self.buffer.is_empty() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(WireError::Cancelled),
            result = self.transport.write_all(self.buffer.as_ref()) => result?,
        }
        self.buffer.clear();
        Ok(())
    }

    /// Flush any staged bytes and flush the transport itself.
    pub async fn finish(&mut self) -> Result<(), WireError> {
        self.flush().await?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WireError::Cancelled),
            result = self.transport.flush() => result.map_err(Into::into),
        }
    }
}
