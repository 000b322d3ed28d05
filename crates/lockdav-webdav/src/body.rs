//! Response body plumbing.

use bytes::Bytes;
use futures::future::{self, Either};
use futures::stream::{self as streams, StreamExt, TryStreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, Empty, Full, StreamBody, combinators::UnsyncBoxBody};
use lockdav_vfs::BoxedStream;
use std::io;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

/// Body type of every response the dispatcher produces.
pub type DavBody = UnsyncBoxBody<Bytes, io::Error>;

pub fn empty() -> DavBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

pub fn full(bytes: impl Into<Bytes>) -> DavBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Stream at most `len` bytes of a backend stream.
pub fn stream(source: BoxedStream, len: u64) -> DavBody {
    let frames = ReaderStream::new(source.take(len)).map_ok(Frame::data);
    StreamBody::new(frames).boxed_unsync()
}

/// One piece of a body assembled by [`concat`].
pub enum Segment {
    Bytes(Bytes),
    /// At most `len` bytes of an already positioned backend stream.
    Stream(BoxedStream, u64),
}

/// Chain segments into one streamed body.
pub fn concat(segments: Vec<Segment>) -> DavBody {
    let frames = streams::iter(segments)
        .flat_map(|segment| match segment {
            Segment::Bytes(bytes) => {
                Either::Left(streams::once(future::ready(Ok::<_, io::Error>(bytes))))
            }
            Segment::Stream(source, len) => Either::Right(ReaderStream::new(source.take(len))),
        })
        .map_ok(Frame::data);
    StreamBody::new(frames).boxed_unsync()
}
