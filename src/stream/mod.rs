// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Upstream stream translation
//
// Responsibilities:
// - Decode the upstream NDJSON byte stream line by line
// - Stream plain text to the client as soon as it arrives
// - Hold back text that opens like a tool call and resolve it at end of stream
// - Render the result as OpenAI SSE chunks or a single chat.completion
// - Stop reading upstream when the client disconnects

mod aggregator;
mod decoder;
mod encoder;
mod processor;
mod types;

pub use aggregator::{Aggregator, Mode};
pub use decoder::{parse_line, LineDecoder};
pub use encoder::{
    interrupted_text, upstream_error_text, ChunkEncoder, CompletionBuilder, ResponseMeta, DONE_FRAME,
};
pub use processor::StreamProcessor;
pub use types::{
    FinishReason, StreamInterrupted, StreamSettings, Unit, UpstreamErrorPolicy, UpstreamFrame,
    DEFAULT_ARGUMENT_CHUNK_CHARS,
};
