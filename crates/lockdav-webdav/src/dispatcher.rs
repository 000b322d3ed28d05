//! Request dispatch: one handler per DAV method.
//!
//! The dispatcher owns the storage backend and the lock manager. Every
//! request is resolved to a normalized resource path (prefix stripped,
//! encoding detected, percent-decoding undone) before a handler runs, and
//! every mutating handler consults the lock manager first.

use crate::body::{self, DavBody, Segment};
use crate::codec::{self, RequestCodec};
use crate::error::{DavError, DavResult};
use crate::headers::{
    self, ByteRange, Conditionals, Depth, http_date, parse_depth, parse_http_date, parse_if,
    parse_lock_token, parse_overwrite, parse_range, parse_timeout,
};
use crate::locks::{Lock, LockDepth, LockManager, LockRequest};
use crate::multistatus::{MultistatusBuilder, PropStat};
use crate::props::{self, PropertyResolver, quote_etag};
use crate::xml::{Element, LockInfo, PropfindRequest, parse_propertyupdate};
use bytes::Bytes;
use http::header::{
    ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, HOST,
    IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, LAST_MODIFIED, RANGE, USER_AGENT,
};
use http::request::Parts;
use http::response::Builder;
use http::{Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use lockdav_vfs::{StreamMode, Vfs, VfsError, path};
use std::io::SeekFrom;
use std::pin::pin;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{Instrument, debug, debug_span, info, warn};
use url::Url;
use uuid::Uuid;

/// Methods advertised in `Allow`.
pub const ALLOWED_METHODS: &str =
    "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, COPY, MOVE, PROPFIND, PROPPATCH, LOCK, UNLOCK";

/// Ranges a multipart GET may carry after merging; more are answered
/// with the whole content.
const MAX_RANGES: usize = 16;

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

const DEPTH: &str = "depth";
const DESTINATION: &str = "destination";
const OVERWRITE: &str = "overwrite";
const LOCK_TOKEN: &str = "lock-token";
const IF: &str = "if";
const TIMEOUT: &str = "timeout";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The DAV methods the dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavMethod {
    Options,
    Get,
    Head,
    Put,
    Delete,
    Mkcol,
    Copy,
    Move,
    Propfind,
    Proppatch,
    Lock,
    Unlock,
}

impl DavMethod {
    pub fn from_http(method: &Method) -> Option<Self> {
        let method = match method.as_str() {
            "OPTIONS" => DavMethod::Options,
            "GET" => DavMethod::Get,
            "HEAD" => DavMethod::Head,
            "PUT" => DavMethod::Put,
            "DELETE" => DavMethod::Delete,
            "MKCOL" => DavMethod::Mkcol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "PROPFIND" => DavMethod::Propfind,
            "PROPPATCH" => DavMethod::Proppatch,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => return None,
        };
        Some(method)
    }
}

/// Per-request state derived from the request line and headers.
#[derive(Debug)]
struct RequestContext {
    path: String,
    encoding: &'static encoding_rs::Encoding,
    user_agent: Option<String>,
    uid: Option<String>,
}

/// A state token from `If`, with its tagged resource already resolved.
#[derive(Debug)]
struct Condition {
    resource: Option<String>,
    token: String,
}

impl Condition {
    fn matches(&self, lock: &Lock, uid: Option<&str>) -> bool {
        lock.token == self.token
            && lock.uid.as_deref() == uid
            && self.resource.as_deref().is_none_or(|r| r == lock.resource)
    }
}

/// Serves WebDAV requests against a [`Vfs`] backend.
#[derive(Clone)]
pub struct DavDispatcher {
    vfs: Arc<dyn Vfs>,
    locks: Arc<LockManager>,
    codec: RequestCodec,
    prefix: String,
}

impl std::fmt::Debug for DavDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DavDispatcher")
            .field("prefix", &self.prefix)
            .field("locking", &self.vfs.locking())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl DavDispatcher {
    pub fn new(vfs: Arc<dyn Vfs>, locks: Arc<LockManager>) -> Self {
        Self {
            vfs,
            locks,
            codec: RequestCodec::default(),
            prefix: String::new(),
        }
    }

    #[must_use]
    pub fn with_codec(mut self, codec: RequestCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Serve resources under `prefix` (e.g. `/dav`) instead of the root.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Handle one request. Failures become bodyless error responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<DavBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let span = debug_span!("dav", method = %req.method(), uri = %req.uri().path());
        async move {
            let result = match DavMethod::from_http(req.method()) {
                Some(method) => self.dispatch(method, req).await,
                None => Err(DavError::MethodNotAllowed),
            };
            match result {
                Ok(response) => {
                    debug!(status = response.status().as_u16(), "request handled");
                    response
                }
                Err(e) => {
                    let status = e.status();
                    if status.is_server_error() {
                        warn!(status = status.as_u16(), error = %e, "request failed");
                    } else {
                        debug!(status = status.as_u16(), error = %e, "request rejected");
                    }
                    e.into_response()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(&self, method: DavMethod, req: Request<B>) -> DavResult<Response<DavBody>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let ctx = self.context(&parts)?;

        if method == DavMethod::Put {
            return self.put(&ctx, &parts, body).await;
        }
        let body = body.collect().await.map_err(body_error)?.to_bytes();

        match method {
            DavMethod::Options => self.options(),
            DavMethod::Get => self.get(&ctx, &parts, true).await,
            DavMethod::Head => self.get(&ctx, &parts, false).await,
            DavMethod::Mkcol => self.mkcol(&ctx, &parts, &body).await,
            DavMethod::Delete => self.delete(&ctx, &parts).await,
            DavMethod::Copy => self.copy_or_move(&ctx, &parts, false).await,
            DavMethod::Move => self.copy_or_move(&ctx, &parts, true).await,
            DavMethod::Propfind => self.propfind(&ctx, &parts, &body).await,
            DavMethod::Proppatch => self.proppatch(&ctx, &parts, &body).await,
            DavMethod::Lock => self.lock(&ctx, &parts, &body).await,
            DavMethod::Unlock => self.unlock(&ctx, &parts),
            // streamed above
            DavMethod::Put => Err(DavError::MethodNotAllowed),
        }
    }

    // ===== Request resolution =====

    fn strip_prefix<'a>(&self, uri_path: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return Some(uri_path);
        }
        match uri_path.strip_prefix(self.prefix.as_str())? {
            "" => Some("/"),
            rest if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    fn context(&self, parts: &Parts) -> DavResult<RequestContext> {
        let user_agent = header(parts, USER_AGENT).map(str::to_string);
        let local = self
            .strip_prefix(parts.uri.path())
            .ok_or_else(|| DavError::NotFound(parts.uri.path().to_string()))?;

        // The destination takes part in encoding detection too.
        let raw_path = codec::percent_decode(local);
        let raw_destination = header(parts, DESTINATION)
            .and_then(split_uri)
            .and_then(|(_, p)| self.strip_prefix(&p).map(codec::percent_decode));
        let mut raw: Vec<&[u8]> = vec![&raw_path];
        if let Some(dest) = &raw_destination {
            raw.push(dest);
        }
        let encoding = self.codec.detect(user_agent.as_deref(), &raw);

        Ok(RequestContext {
            path: self.codec.resource_path(local, encoding),
            encoding,
            user_agent,
            uid: header(parts, AUTHORIZATION).and_then(headers::basic_auth_user),
        })
    }

    /// Resolve the `Destination` header to a resource path.
    fn destination(&self, ctx: &RequestContext, parts: &Parts) -> DavResult<String> {
        let value = header(parts, DESTINATION)
            .ok_or_else(|| DavError::BadRequest("missing Destination".into()))?;
        let (authority, uri_path) = split_uri(value)
            .ok_or_else(|| DavError::BadRequest(format!("bad Destination: {value}")))?;
        if let Some(dest) = authority
            && let Some(local) = request_authority(parts)
            && dest != local
        {
            return Err(DavError::BadGateway(value.to_string()));
        }
        let local = self
            .strip_prefix(&uri_path)
            .ok_or_else(|| DavError::NotFound(uri_path.clone()))?;
        Ok(self.codec.resource_path(local, ctx.encoding))
    }

    /// Resolve a tagged `If` resource. Foreign hosts resolve to nothing.
    fn resolve_tag(&self, ctx: &RequestContext, parts: &Parts, uri: &str) -> Option<String> {
        let (authority, uri_path) = split_uri(uri)?;
        if let Some(tag) = authority
            && request_authority(parts).is_some_and(|local| local != tag)
        {
            return None;
        }
        let local = self.strip_prefix(&uri_path)?;
        Some(self.codec.resource_path(local, ctx.encoding))
    }

    fn conditions(&self, ctx: &RequestContext, parts: &Parts) -> DavResult<Vec<Condition>> {
        let Some(value) = header(parts, IF) else {
            return Ok(Vec::new());
        };
        let parsed = parse_if(value).map_err(|e| DavError::BadRequest(e.to_string()))?;
        Ok(parsed
            .into_iter()
            .filter_map(|c| {
                let resource = match c.resource {
                    Some(uri) => Some(self.resolve_tag(ctx, parts, &uri)?),
                    None => None,
                };
                Some(Condition {
                    resource,
                    token: c.token,
                })
            })
            .collect())
    }

    /// Fail with `Locked` unless the request holds a token for a lock on
    /// `resource`.
    ///
    /// Any lock reaching the path will do, so the holder of an infinite
    /// collection lock can still write below a shared member lock.
    fn check_lock(&self, ctx: &RequestContext, parts: &Parts, resource: &str) -> DavResult<()> {
        if !self.vfs.locking() {
            return Ok(());
        }
        let locks = self.locks.covering(resource);
        if locks.is_empty() {
            return Ok(());
        }
        let conditions = self.conditions(ctx, parts)?;
        let uid = ctx.uid.as_deref();
        if locks
            .iter()
            .any(|lock| conditions.iter().any(|c| c.matches(lock, uid)))
        {
            return Ok(());
        }
        debug!(resource = %resource, locks = locks.len(), "no matching lock token");
        Err(DavError::Locked(resource.to_string()))
    }

    /// [`check_lock`](Self::check_lock) for a whole subtree about to be
    /// removed: every lock held below `resource` needs its token too.
    fn check_tree_lock(&self, ctx: &RequestContext, parts: &Parts, resource: &str) -> DavResult<()> {
        self.check_lock(ctx, parts, resource)?;
        if !self.vfs.locking() {
            return Ok(());
        }
        let below = self.locks.locked_below(resource);
        if below.is_empty() {
            return Ok(());
        }
        let conditions = self.conditions(ctx, parts)?;
        let uid = ctx.uid.as_deref();
        match below
            .iter()
            .find(|lock| !conditions.iter().any(|c| c.matches(lock, uid)))
        {
            Some(lock) => {
                debug!(resource = %resource, member = %lock.resource, "member locked");
                Err(DavError::Locked(lock.resource.clone()))
            }
            None => Ok(()),
        }
    }

    // ===== Method handlers =====

    fn options(&self) -> DavResult<Response<DavBody>> {
        let dav = if self.vfs.locking() { "1, 2" } else { "1" };
        finish(
            respond(StatusCode::OK)
                .header("dav", dav)
                .header("ms-author-via", "DAV")
                .header(http::header::ALLOW, ALLOWED_METHODS)
                .header(CONTENT_LENGTH, 0),
            body::empty(),
        )
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
        with_body: bool,
    ) -> DavResult<Response<DavBody>> {
        let props = self.vfs.properties(&ctx.path).await?;
        let etag = quote_etag(&props.etag);
        let builder = Response::builder()
            .header(ETAG, &etag)
            .header(LAST_MODIFIED, http_date(props.modified));

        let conditionals = Conditionals {
            if_range: header(parts, IF_RANGE),
            if_modified_since: header(parts, IF_MODIFIED_SINCE),
            if_none_match: header(parts, IF_NONE_MATCH),
        };
        if conditionals.not_modified(props.modified, &etag) {
            return finish(builder.status(StatusCode::NOT_MODIFIED), body::empty());
        }

        let builder = builder.header(CONTENT_TYPE, &props.content_type);
        if props.is_collection {
            return finish(
                builder.status(StatusCode::OK).header(CONTENT_LENGTH, 0),
                body::empty(),
            );
        }

        let len = props.content_length.unwrap_or(0);
        if let Some(value) = header(parts, RANGE) {
            let ranges = parse_range(value).map_err(|e| DavError::BadRequest(e.to_string()))?;
            if len > 0 {
                return self.get_ranges(ctx, builder, &props.content_type, &ranges, len, with_body).await;
            }
        }

        self.get_full(ctx, builder, len, with_body).await
    }

    async fn get_ranges(
        &self,
        ctx: &RequestContext,
        builder: Builder,
        content_type: &str,
        ranges: &[ByteRange],
        len: u64,
        with_body: bool,
    ) -> DavResult<Response<DavBody>> {
        let resolved = merge_ranges(ranges.iter().filter_map(|r| r.resolve(len)).collect());
        if resolved.is_empty() {
            return Err(DavError::RangeNotSatisfiable(len));
        }
        if ranges.len() > 1 && (resolved.len() > MAX_RANGES || resolved[..] == [(0, len - 1)]) {
            debug!(path = %ctx.path, ranges = ranges.len(), "serving full content for range request");
            return self.get_full(ctx, builder, len, with_body).await;
        }
        let builder = builder.status(StatusCode::PARTIAL_CONTENT);

        if let [(first, last)] = resolved[..] {
            let count = last - first + 1;
            let builder = builder
                .header(CONTENT_RANGE, format!("bytes {first}-{last}/{len}"))
                .header(CONTENT_LENGTH, count);
            if !with_body {
                return finish(builder, body::empty());
            }
            let mut source = self.vfs.stream(&ctx.path, StreamMode::Read).await?;
            source.seek(SeekFrom::Start(first)).await?;
            return finish(builder, body::stream(source, count));
        }

        let boundary = Uuid::new_v4().simple().to_string();
        let mut parts = Vec::with_capacity(resolved.len());
        let mut total = 0;
        for &(first, last) in &resolved {
            let head = format!(
                "--{boundary}\r\nContent-Type: {content_type}\r\nContent-Range: bytes {first}-{last}/{len}\r\n\r\n"
            );
            let count = last - first + 1;
            total += head.len() as u64 + count + 2;
            parts.push((head, first, count));
        }
        let closing = format!("--{boundary}--\r\n");
        total += closing.len() as u64;

        let builder = builder
            .header(
                CONTENT_TYPE,
                format!("multipart/byteranges; boundary={boundary}"),
            )
            .header(CONTENT_LENGTH, total);
        if !with_body {
            return finish(builder, body::empty());
        }

        let mut segments = Vec::with_capacity(parts.len() * 3 + 1);
        for (head, first, count) in parts {
            let mut source = self.vfs.stream(&ctx.path, StreamMode::Read).await?;
            source.seek(SeekFrom::Start(first)).await?;
            segments.push(Segment::Bytes(Bytes::from(head)));
            segments.push(Segment::Stream(source, count));
            segments.push(Segment::Bytes(Bytes::from_static(b"\r\n")));
        }
        segments.push(Segment::Bytes(Bytes::from(closing)));
        finish(builder, body::concat(segments))
    }

    async fn get_full(
        &self,
        ctx: &RequestContext,
        builder: Builder,
        len: u64,
        with_body: bool,
    ) -> DavResult<Response<DavBody>> {
        let body = if with_body {
            body::stream(self.vfs.stream(&ctx.path, StreamMode::Read).await?, len)
        } else {
            body::empty()
        };
        finish(
            builder
                .status(StatusCode::OK)
                .header(ACCEPT_RANGES, "bytes")
                .header(CONTENT_LENGTH, len),
            body,
        )
    }

    async fn put<B>(&self, ctx: &RequestContext, parts: &Parts, body: B) -> DavResult<Response<DavBody>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        self.check_lock(ctx, parts, &ctx.path)?;

        let offset = match header(parts, RANGE) {
            None => None,
            Some(value) => {
                let ranges = parse_range(value).map_err(|e| DavError::BadRequest(e.to_string()))?;
                match ranges[..] {
                    [ByteRange::From { first, .. }] => Some(first),
                    [ByteRange::Suffix(_)] => {
                        return Err(DavError::BadRequest("suffix range on PUT".into()));
                    }
                    _ => return Err(DavError::NotImplemented("multiple ranges on PUT".into())),
                }
            }
        };

        if self.vfs.is_collection(&ctx.path).await? {
            return Err(DavError::MethodNotAllowed);
        }
        let existed = self.vfs.exists(&ctx.path).await?;
        let mode = if offset.is_some() {
            StreamMode::ReadWrite
        } else {
            StreamMode::Write
        };
        let mut target = self.vfs.stream(&ctx.path, mode).await.map_err(store_error)?;
        if let Some(offset) = offset {
            target.seek(SeekFrom::Start(offset)).await?;
        }

        let mut body = pin!(body);
        let mut written = 0u64;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(body_error)?;
            if let Ok(data) = frame.into_data() {
                target
                    .write_all(&data)
                    .await
                    .map_err(|e| store_error(VfsError::from_io(e, &ctx.path)))?;
                written += data.len() as u64;
            }
        }
        target
            .shutdown()
            .await
            .map_err(|e| store_error(VfsError::from_io(e, &ctx.path)))?;

        debug!(path = %ctx.path, bytes = written, created = !existed, "stored resource");
        let status = if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        finish(respond(status).header(CONTENT_LENGTH, 0), body::empty())
    }

    async fn mkcol(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
        body: &Bytes,
    ) -> DavResult<Response<DavBody>> {
        if !body.is_empty() {
            return Err(DavError::MethodNotAllowed);
        }
        self.check_lock(ctx, parts, &ctx.path)?;
        self.vfs.mkdir(&ctx.path).await.map_err(|e| match e {
            VfsError::AlreadyExists(p) => DavError::Conflict(p),
            VfsError::ParentMissing(p)
            | VfsError::NotFound(p)
            | VfsError::NotACollection(p)
            | VfsError::PermissionDenied(p) => DavError::Forbidden(p),
            other => other.into(),
        })?;
        debug!(path = %ctx.path, "created collection");
        finish(respond(StatusCode::CREATED).header(CONTENT_LENGTH, 0), body::empty())
    }

    async fn delete(&self, ctx: &RequestContext, parts: &Parts) -> DavResult<Response<DavBody>> {
        self.check_tree_lock(ctx, parts, &ctx.path)?;
        if !self.vfs.exists(&ctx.path).await? {
            return Err(DavError::NotFound(ctx.path.clone()));
        }
        self.vfs.remove(&ctx.path).await?;
        if self.vfs.locking() {
            self.locks.unlock_all(&ctx.path);
        }
        debug!(path = %ctx.path, "deleted resource");
        finish(respond(StatusCode::NO_CONTENT), body::empty())
    }

    async fn copy_or_move(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
        is_move: bool,
    ) -> DavResult<Response<DavBody>> {
        let recursive = match header(parts, DEPTH).map(parse_depth) {
            None | Some(Ok(Depth::Infinity)) => true,
            Some(Ok(Depth::Finite(0))) => false,
            Some(Ok(Depth::Finite(n))) => {
                return Err(DavError::BadRequest(format!("Depth {n} on COPY/MOVE")));
            }
            Some(Err(e)) => return Err(DavError::BadRequest(e.to_string())),
        };
        let src = ctx.path.as_str();
        let dest = self.destination(ctx, parts)?;
        if dest == src {
            return Err(DavError::Forbidden("source and destination are the same".into()));
        }
        if path::is_descendant(&dest, src) {
            return Err(DavError::Forbidden(format!("{dest} is inside {src}")));
        }

        if is_move {
            self.check_tree_lock(ctx, parts, src)?;
        }
        self.check_tree_lock(ctx, parts, &dest)?;

        if !self.vfs.exists(src).await? {
            return Err(DavError::NotFound(src.to_string()));
        }
        let existed = self.vfs.exists(&dest).await?;
        if existed {
            if !parse_overwrite(header(parts, OVERWRITE)) {
                return Err(DavError::PreconditionFailed(format!("{dest} exists")));
            }
            self.vfs.remove(&dest).await?;
            if self.vfs.locking() {
                self.locks.unlock_all(&dest);
            }
        }

        if is_move {
            self.vfs.rename(src, &dest).await.map_err(store_error)?;
            if self.vfs.locking() {
                self.locks.unlock_all(src);
            }
        } else {
            self.vfs
                .copy(src, &dest, recursive)
                .await
                .map_err(store_error)?;
        }
        debug!(
            from = %src,
            to = %dest,
            op = if is_move { "move" } else { "copy" },
            replaced = existed,
            "transferred resource"
        );

        let status = if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        finish(respond(status).header(CONTENT_LENGTH, 0), body::empty())
    }

    async fn propfind(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
        body: &Bytes,
    ) -> DavResult<Response<DavBody>> {
        let depth = match header(parts, DEPTH) {
            None => return Err(DavError::Forbidden("infinite depth PROPFIND".into())),
            Some(value) => match parse_depth(value).map_err(|e| DavError::BadRequest(e.to_string()))? {
                Depth::Infinity => {
                    return Err(DavError::Forbidden("infinite depth PROPFIND".into()));
                }
                Depth::Finite(n) => n,
            },
        };
        let names = match PropfindRequest::parse(body).map_err(|e| DavError::BadRequest(e.to_string()))? {
            PropfindRequest::AllProp => props::all_props(self.vfs.locking()),
            PropfindRequest::PropName => {
                return Err(DavError::NotImplemented("propname".into()));
            }
            PropfindRequest::Props(names) => names,
        };
        if !self.vfs.exists(&ctx.path).await? {
            return Err(DavError::NotFound(ctx.path.clone()));
        }

        let resolver = PropertyResolver::new(self.vfs.as_ref(), &self.locks)
            .with_user_agent(ctx.user_agent.as_deref());
        let mut multistatus = MultistatusBuilder::new();
        let mut pending = vec![(ctx.path.clone(), depth)];
        while let Some((resource, remaining)) = pending.pop() {
            let collection = self.vfs.is_collection(&resource).await.unwrap_or(false);
            let propstats = resolver.propstats(&resource, &names).await;
            multistatus.add_propstats(&codec::href(&self.prefix, &resource, collection), &propstats);

            if collection && remaining > 0 {
                match self.vfs.list_children(&resource).await {
                    Ok(children) => {
                        for child in children.iter().rev() {
                            pending.push((path::join(&resource, child), remaining - 1));
                        }
                    }
                    Err(e) => warn!(path = %resource, error = %e, "failed to list collection"),
                }
            }
        }
        debug!(path = %ctx.path, depth, responses = multistatus.len(), "propfind");
        multistatus_response(&multistatus, respond(StatusCode::MULTI_STATUS))
    }

    async fn proppatch(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
        body: &Bytes,
    ) -> DavResult<Response<DavBody>> {
        if !self.vfs.exists(&ctx.path).await? {
            return Err(DavError::NotFound(ctx.path.clone()));
        }
        self.check_lock(ctx, parts, &ctx.path)?;
        let patches = parse_propertyupdate(body).map_err(|e| DavError::BadRequest(e.to_string()))?;

        let mut propstats = Vec::with_capacity(patches.len());
        for patch in patches {
            let status = match &patch.value {
                Some(value) if patch.name.is_dav() && patch.name.name == "getlastmodified" => {
                    match parse_http_date(value) {
                        None => StatusCode::CONFLICT,
                        Some(time) => match self.vfs.set_modified(&ctx.path, time).await {
                            Ok(()) => StatusCode::OK,
                            Err(VfsError::PermissionDenied(_)) => StatusCode::CONFLICT,
                            Err(e) => {
                                warn!(path = %ctx.path, error = %e, "failed to set modification time");
                                StatusCode::INTERNAL_SERVER_ERROR
                            }
                        },
                    }
                }
                // Removals and every other property are read-only.
                _ => StatusCode::FORBIDDEN,
            };
            propstats.push(PropStat::new(vec![Element::from_prop_name(&patch.name)], status));
        }

        let collection = self.vfs.is_collection(&ctx.path).await?;
        let mut multistatus = MultistatusBuilder::new();
        multistatus.add_propstats(&codec::href(&self.prefix, &ctx.path, collection), &propstats);
        multistatus_response(&multistatus, respond(StatusCode::MULTI_STATUS))
    }

    async fn lock(
        &self,
        ctx: &RequestContext,
        parts: &Parts,
        body: &Bytes,
    ) -> DavResult<Response<DavBody>> {
        if !self.vfs.locking() {
            return Err(DavError::NotImplemented("locking disabled".into()));
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return self.refresh(ctx, parts);
        }

        let info = LockInfo::parse(body).map_err(|e| DavError::BadRequest(e.to_string()))?;
        let depth = match header(parts, DEPTH).map(parse_depth) {
            Some(Ok(Depth::Infinity)) => LockDepth::Infinite,
            _ => LockDepth::Zero,
        };
        let request = LockRequest {
            scope: info.scope,
            depth,
            owner: info.owner,
            timeout: header(parts, TIMEOUT).and_then(parse_timeout),
            uid: ctx.uid.clone(),
        };

        let existed = self.vfs.exists(&ctx.path).await?;
        if !existed {
            // Creating the resource writes into the parent collection.
            self.check_lock(ctx, parts, &ctx.path)?;
        }
        let collection = self.vfs.is_collection(&ctx.path).await.unwrap_or(false);
        let href = codec::href(&self.prefix, &ctx.path, collection);
        let Some(lock) = self.locks.lock(&ctx.path, request) else {
            debug!(path = %ctx.path, "lock conflict");
            let mut multistatus = MultistatusBuilder::new();
            multistatus.add_status(&href, StatusCode::LOCKED);
            return multistatus_response(&multistatus, respond(StatusCode::MULTI_STATUS));
        };

        // Locking an unmapped URL creates an empty resource there.
        if !existed {
            let created = async {
                let mut stream = self.vfs.stream(&ctx.path, StreamMode::Write).await?;
                stream
                    .shutdown()
                    .await
                    .map_err(|e| VfsError::from_io(e, &ctx.path))
            }
            .await;
            if let Err(e) = created {
                self.locks.unlock(&ctx.path, &lock.token, lock.uid.as_deref());
                return Err(store_error(e));
            }
        }
        info!(path = %ctx.path, token = %lock.token, scope = lock.scope.as_str(), depth = lock.depth.as_str(), "locked");

        let active = self.locks.locked(&ctx.path).unwrap_or_default();
        let mut multistatus = MultistatusBuilder::new();
        multistatus.add_propstats(
            &href,
            &[PropStat::new(
                vec![props::lockdiscovery(&active, &self.locks)],
                StatusCode::OK,
            )],
        );
        multistatus_response(
            &multistatus,
            respond(StatusCode::MULTI_STATUS)
                .header(LOCK_TOKEN, format!("<{}>", lock.wire_token())),
        )
    }

    /// LOCK without a body: extend every lock named in `If`.
    fn refresh(&self, ctx: &RequestContext, parts: &Parts) -> DavResult<Response<DavBody>> {
        let uid = ctx.uid.as_deref();
        let mut matched = 0;
        let conditions = self.conditions(ctx, parts)?;
        for condition in &conditions {
            let resource = condition.resource.as_deref().unwrap_or(&ctx.path);
            for lock in self.locks.covering(resource) {
                if condition.matches(&lock, uid) {
                    matched += 1;
                    self.locks.refresh(&lock);
                }
            }
        }
        debug!(path = %ctx.path, matched, "refreshed locks");
        if matched == 0 && !conditions.is_empty() {
            return Err(DavError::PreconditionFailed(format!(
                "no lock named in If on {}",
                ctx.path
            )));
        }
        finish(respond(StatusCode::NO_CONTENT), body::empty())
    }

    fn unlock(&self, ctx: &RequestContext, parts: &Parts) -> DavResult<Response<DavBody>> {
        if !self.vfs.locking() {
            return Err(DavError::NotImplemented("locking disabled".into()));
        }
        let value = header(parts, LOCK_TOKEN)
            .ok_or_else(|| DavError::BadRequest("missing Lock-Token".into()))?;
        let token = parse_lock_token(value).map_err(|e| DavError::BadRequest(e.to_string()))?;
        if !self.locks.unlock(&ctx.path, &token, ctx.uid.as_deref()) {
            return Err(DavError::Forbidden(format!("no lock {token} on {}", ctx.path)));
        }
        info!(path = %ctx.path, token = %token, "unlocked");
        finish(respond(StatusCode::NO_CONTENT), body::empty())
    }
}

// ===== Helpers =====

fn header<K: http::header::AsHeaderName>(parts: &Parts, key: K) -> Option<&str> {
    parts.headers.get(key).and_then(|v| v.to_str().ok())
}

fn respond(status: StatusCode) -> Builder {
    Response::builder().status(status)
}

fn finish(builder: Builder, body: DavBody) -> DavResult<Response<DavBody>> {
    builder
        .body(body)
        .map_err(|e| DavError::Internal(e.to_string()))
}

fn multistatus_response(
    multistatus: &MultistatusBuilder,
    builder: Builder,
) -> DavResult<Response<DavBody>> {
    let xml = multistatus
        .build()
        .map_err(|e| DavError::Internal(e.to_string()))?;
    finish(
        builder
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(CONTENT_LENGTH, xml.len()),
        body::full(xml),
    )
}

/// Sort resolved ranges and coalesce overlapping or adjacent ones.
fn merge_ranges(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (first, last) in ranges {
        match merged.last_mut() {
            Some(prev) if first <= prev.1.saturating_add(1) => prev.1 = prev.1.max(last),
            _ => merged.push((first, last)),
        }
    }
    merged
}

fn body_error<E: Into<BoxError>>(e: E) -> DavError {
    DavError::BadRequest(format!("request body: {}", e.into()))
}

/// Backend failures while creating or replacing content.
fn store_error(e: VfsError) -> DavError {
    match e {
        VfsError::ParentMissing(p) | VfsError::NotFound(p) => DavError::Conflict(p),
        other => other.into(),
    }
}

/// Split a URI into its `(host, port)` and raw path. Relative references
/// have no authority.
fn split_uri(value: &str) -> Option<(Option<(String, u16)>, String)> {
    let value = value.trim();
    if value.starts_with('/') {
        let uri_path = value.split(['?', '#']).next().unwrap_or(value);
        return Some((None, uri_path.to_string()));
    }
    let url = Url::parse(value).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let port = url.port_or_known_default()?;
    Some((Some((host, port)), url.path().to_string()))
}

/// `(host, port)` the request was addressed to.
fn request_authority(parts: &Parts) -> Option<(String, u16)> {
    let authority = header(parts, HOST).or_else(|| parts.uri.authority().map(|a| a.as_str()))?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        (format!("[{host}]"), tail.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (authority.to_string(), None),
        }
    };
    let port = match port {
        Some(p) => p.parse().ok()?,
        None => 80,
    };
    Some((host.to_ascii_lowercase(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{LockConfig, ManualClock};
    use http::HeaderMap;
    use http_body_util::Full;
    use lockdav_vfs::MemFs;
    use std::time::Duration;

    fn dispatcher() -> DavDispatcher {
        DavDispatcher::new(Arc::new(MemFs::new()), Arc::new(LockManager::default()))
    }

    fn request(method: &str, uri: &str) -> http::request::Builder {
        Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(uri)
            .header(HOST, "localhost:8080")
    }

    async fn send(
        d: &DavDispatcher,
        builder: http::request::Builder,
        body: &'static str,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let req = builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap();
        let (parts, body) = d.handle(req).await.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, parts.headers, bytes)
    }

    const LOCKINFO: &str = r#"<?xml version="1.0"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>mailto:alice@example.org</D:href></D:owner>
</D:lockinfo>"#;

    async fn lock(d: &DavDispatcher, uri: &str, depth: &str) -> String {
        let (status, headers, _) =
            send(d, request("LOCK", uri).header("Depth", depth), LOCKINFO).await;
        assert_eq!(status, StatusCode::MULTI_STATUS);
        headers[LOCK_TOKEN].to_str().unwrap().to_string()
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            DavMethod::from_http(&Method::from_bytes(b"PROPFIND").unwrap()),
            Some(DavMethod::Propfind)
        );
        assert_eq!(DavMethod::from_http(&Method::PATCH), None);
    }

    #[test]
    fn test_split_uri() {
        assert_eq!(
            split_uri("http://Example.org/a%20b?x=1"),
            Some((Some(("example.org".into(), 80)), "/a%20b".into()))
        );
        assert_eq!(split_uri("/a/b?q"), Some((None, "/a/b".into())));
        assert_eq!(split_uri("not a uri"), None);
    }

    #[tokio::test]
    async fn test_put_get_and_overwrite() {
        let d = dispatcher();
        let (status, _, _) = send(&d, request("PUT", "/file1"), "hello").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _, _) = send(&d, request("PUT", "/file1"), "world!").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, headers, body) = send(&d, request("GET", "/file1"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"world!");
        assert_eq!(headers[CONTENT_LENGTH], "6");

        let (status, headers, body) = send(&d, request("HEAD", "/file1"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert!(headers.contains_key(ETAG));
    }

    #[tokio::test]
    async fn test_put_into_missing_parent_conflicts() {
        let d = dispatcher();
        let (status, _, _) = send(&d, request("PUT", "/nope/file"), "x").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ranges() {
        let d = dispatcher();
        send(&d, request("PUT", "/f"), "0123456789").await;

        let (status, headers, body) =
            send(&d, request("GET", "/f").header(RANGE, "bytes=2-4"), "").await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(&body[..], b"234");
        assert_eq!(headers[CONTENT_RANGE], "bytes 2-4/10");

        let (status, headers, body) =
            send(&d, request("GET", "/f").header(RANGE, "bytes=0-1,-2"), "").await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        let content_type = headers[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/byteranges; boundary="));
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Content-Range: bytes 0-1/10\r\n\r\n01\r\n"));
        assert!(text.contains("Content-Range: bytes 8-9/10\r\n\r\n89\r\n"));

        let (status, headers, _) =
            send(&d, request("GET", "/f").header(RANGE, "bytes=20-30"), "").await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers[CONTENT_RANGE], "bytes */10");

        let (status, _, _) = send(&d, request("GET", "/f").header(RANGE, "lines=1-2"), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_partial_put() {
        let d = dispatcher();
        send(&d, request("PUT", "/f"), "0123456789").await;
        let (status, _, _) =
            send(&d, request("PUT", "/f").header(RANGE, "bytes=3-"), "xyz").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, _, body) = send(&d, request("GET", "/f"), "").await;
        assert_eq!(&body[..], b"012xyz6789");

        let (status, _, _) =
            send(&d, request("PUT", "/f").header(RANGE, "bytes=0-1,4-5"), "ab").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_mkcol() {
        let d = dispatcher();
        assert_eq!(send(&d, request("MKCOL", "/dir"), "").await.0, StatusCode::CREATED);
        assert_eq!(send(&d, request("MKCOL", "/dir"), "").await.0, StatusCode::CONFLICT);
        assert_eq!(send(&d, request("MKCOL", "/a/b"), "").await.0, StatusCode::FORBIDDEN);
        assert_eq!(
            send(&d, request("MKCOL", "/other"), "<x/>").await.0,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_lock_blocks_writes_without_token() {
        let d = dispatcher();
        send(&d, request("PUT", "/file1"), "data").await;
        let token = lock(&d, "/file1", "0").await;

        let (status, _, _) = send(&d, request("PUT", "/file1"), "other").await;
        assert_eq!(status, StatusCode::LOCKED);

        let (status, _, _) =
            send(&d, request("PUT", "/file1").header(IF, format!("({token})")), "other").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = send(&d, request("UNLOCK", "/file1").header(LOCK_TOKEN, &token), "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&d, request("DELETE", "/file1"), "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_conflicting_lock_is_multistatus_423() {
        let d = dispatcher();
        send(&d, request("PUT", "/file1"), "data").await;
        lock(&d, "/file1", "0").await;
        let (status, headers, body) =
            send(&d, request("LOCK", "/file1").header("Depth", "0"), LOCKINFO).await;
        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert!(!headers.contains_key(LOCK_TOKEN));
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("HTTP/1.1 423 Locked"));
    }

    #[tokio::test]
    async fn test_depth_infinity_lock_covers_descendants() {
        let d = dispatcher();
        send(&d, request("MKCOL", "/dir"), "").await;
        send(&d, request("MKCOL", "/dir/sub"), "").await;
        let token = lock(&d, "/dir", "infinity").await;

        let (status, _, _) = send(&d, request("PUT", "/dir/sub/f"), "x").await;
        assert_eq!(status, StatusCode::LOCKED);
        let (status, _, _) =
            send(&d, request("PUT", "/dir/sub/f").header(IF, format!("({token})")), "x").await;
        assert_eq!(status, StatusCode::CREATED);
        // Tagged with the wrong resource.
        let (status, _, _) = send(
            &d,
            request("PUT", "/dir/sub/f").header(IF, format!("<http://localhost:8080/dir/sub> ({token})")),
            "y",
        )
        .await;
        assert_eq!(status, StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn test_depth_zero_lock_does_not_cover_children() {
        let d = dispatcher();
        send(&d, request("MKCOL", "/dir"), "").await;
        lock(&d, "/dir", "0").await;
        let (status, _, _) = send(&d, request("PUT", "/dir/f"), "x").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_lock_creates_missing_resource() {
        let d = dispatcher();
        lock(&d, "/new", "0").await;
        let (status, headers, _) = send(&d, request("GET", "/new"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_lock_expiry_and_refresh() {
        let clock = Arc::new(ManualClock::new());
        let config = LockConfig {
            default_timeout: Some(Duration::from_secs(60)),
        };
        let locks = LockManager::with_clock(config, Box::new(Arc::clone(&clock)));
        let d = DavDispatcher::new(Arc::new(MemFs::new()), Arc::new(locks));
        send(&d, request("PUT", "/f"), "x").await;

        let (_, headers, _) = send(
            &d,
            request("LOCK", "/f").header(TIMEOUT, "Second-60"),
            LOCKINFO,
        )
        .await;
        let token = headers[LOCK_TOKEN].to_str().unwrap().to_string();

        clock.advance(Duration::from_secs(50));
        let (status, _, _) = send(&d, request("LOCK", "/f").header(IF, format!("({token})")), "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        clock.advance(Duration::from_secs(50));
        assert_eq!(send(&d, request("PUT", "/f"), "y").await.0, StatusCode::LOCKED);

        clock.advance(Duration::from_secs(11));
        assert_eq!(send(&d, request("PUT", "/f"), "y").await.0, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_refresh_with_unknown_token_fails() {
        let d = dispatcher();
        send(&d, request("PUT", "/f"), "x").await;
        let token = lock(&d, "/f", "0").await;

        let stale = "(<opaquelocktoken:00000000-0000-0000-0000-000000000000>)";
        let (status, _, _) = send(&d, request("LOCK", "/f").header(IF, stale), "").await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);

        // Without a default timeout a matching refresh is still accepted.
        let (status, _, _) = send(&d, request("LOCK", "/f").header(IF, format!("({token})")), "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unlock_errors() {
        let d = dispatcher();
        send(&d, request("PUT", "/f"), "x").await;
        let token = lock(&d, "/f", "0").await;

        let (status, _, _) = send(&d, request("UNLOCK", "/f"), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = send(&d, request("UNLOCK", "/other").header(LOCK_TOKEN, &token), "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = send(
            &d,
            request("UNLOCK", "/f").header(LOCK_TOKEN, "<opaquelocktoken:nope>"),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_lock_owner_is_bound_to_user() {
        let d = dispatcher();
        send(&d, request("PUT", "/f"), "x").await;
        // alice:secret
        let alice = "Basic YWxpY2U6c2VjcmV0";
        let (_, headers, _) = send(
            &d,
            request("LOCK", "/f").header(AUTHORIZATION, alice),
            LOCKINFO,
        )
        .await;
        let token = headers[LOCK_TOKEN].to_str().unwrap().to_string();

        let (status, _, _) =
            send(&d, request("PUT", "/f").header(IF, format!("({token})")), "y").await;
        assert_eq!(status, StatusCode::LOCKED);
        let (status, _, _) = send(
            &d,
            request("PUT", "/f")
                .header(IF, format!("({token})"))
                .header(AUTHORIZATION, alice),
            "y",
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_copy_move_checks() {
        let d = dispatcher();
        send(&d, request("MKCOL", "/dir"), "").await;
        send(&d, request("PUT", "/dir/f"), "x").await;

        let copy = |to: &str| request("COPY", "/dir").header(DESTINATION, to.to_string());
        assert_eq!(send(&d, copy("/dir"), "").await.0, StatusCode::FORBIDDEN);
        assert_eq!(send(&d, copy("/dir/inner"), "").await.0, StatusCode::FORBIDDEN);
        assert_eq!(
            send(&d, copy("http://elsewhere:8080/copy"), "").await.0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(send(&d, request("COPY", "/dir"), "").await.0, StatusCode::BAD_REQUEST);
        assert_eq!(
            send(&d, copy("/copy").header(DEPTH, "1"), "").await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(send(&d, copy("http://localhost:8080/copy"), "").await.0, StatusCode::CREATED);
        assert_eq!(send(&d, copy("/copy"), "").await.0, StatusCode::PRECONDITION_FAILED);
        assert_eq!(
            send(&d, copy("/copy").header(OVERWRITE, "T"), "").await.0,
            StatusCode::NO_CONTENT
        );
        assert_eq!(send(&d, request("GET", "/copy/f"), "").await.0, StatusCode::OK);

        let (status, _, _) =
            send(&d, request("MOVE", "/copy").header(DESTINATION, "/moved"), "").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(send(&d, request("GET", "/copy/f"), "").await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&d, request("GET", "/moved/f"), "").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_move_releases_source_locks() {
        let d = dispatcher();
        send(&d, request("PUT", "/a"), "x").await;
        let token = lock(&d, "/a", "0").await;
        let (status, _, _) = send(&d, request("MOVE", "/a").header(DESTINATION, "/b"), "").await;
        assert_eq!(status, StatusCode::LOCKED);
        let (status, _, _) = send(
            &d,
            request("MOVE", "/a")
                .header(DESTINATION, "/b")
                .header(IF, format!("({token})")),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(d.lock_manager().is_empty());
    }

    #[tokio::test]
    async fn test_propfind() {
        let d = dispatcher();
        send(&d, request("MKCOL", "/dir"), "").await;
        send(&d, request("PUT", "/dir/a.txt"), "abc").await;

        assert_eq!(send(&d, request("PROPFIND", "/dir"), "").await.0, StatusCode::FORBIDDEN);
        assert_eq!(
            send(&d, request("PROPFIND", "/dir").header(DEPTH, "x"), "").await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            send(&d, request("PROPFIND", "/missing").header(DEPTH, "0"), "").await.0,
            StatusCode::NOT_FOUND
        );

        let (status, headers, body) =
            send(&d, request("PROPFIND", "/dir").header(DEPTH, "1"), "").await;
        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert!(headers[CONTENT_TYPE].to_str().unwrap().starts_with("text/xml"));
        let text = String::from_utf8(body.to_vec()).unwrap();
        let dir = text.find("<D:href>/dir/</D:href>").unwrap();
        let file = text.find("<D:href>/dir/a.txt</D:href>").unwrap();
        assert!(dir < file);
        assert!(text.contains("<D:getcontentlength>3</D:getcontentlength>"));

        let propname = r#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert_eq!(
            send(&d, request("PROPFIND", "/dir").header(DEPTH, "0"), propname).await.0,
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[tokio::test]
    async fn test_proppatch() {
        let d = dispatcher();
        send(&d, request("PUT", "/f"), "x").await;
        let body = r#"<D:propertyupdate xmlns:D="DAV:">
  <D:set><D:prop><D:getlastmodified>Sun, 06 Nov 1994 08:49:37 GMT</D:getlastmodified></D:prop></D:set>
  <D:remove><D:prop><D:displayname/></D:prop></D:remove>
</D:propertyupdate>"#;
        let (status, _, xml) = send(&d, request("PROPPATCH", "/f"), body).await;
        assert_eq!(status, StatusCode::MULTI_STATUS);
        let text = String::from_utf8(xml.to_vec()).unwrap();
        assert!(text.contains("<D:getlastmodified/></D:prop><D:status>HTTP/1.1 200 OK"));
        assert!(text.contains("<D:displayname/></D:prop><D:status>HTTP/1.1 403 Forbidden"));

        let (_, headers, _) = send(&d, request("HEAD", "/f"), "").await;
        assert_eq!(headers[LAST_MODIFIED], "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[tokio::test]
    async fn test_prefix() {
        let d = dispatcher().with_prefix("/dav/");
        assert_eq!(send(&d, request("PUT", "/dav/f"), "x").await.0, StatusCode::CREATED);
        assert_eq!(send(&d, request("GET", "/f"), "").await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&d, request("GET", "/davf"), "").await.0, StatusCode::NOT_FOUND);
        let (_, _, body) = send(&d, request("PROPFIND", "/dav").header(DEPTH, "1"), "").await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("<D:href>/dav/</D:href>"));
        assert!(text.contains("<D:href>/dav/f</D:href>"));
    }

    #[tokio::test]
    async fn test_options_and_unknown_method() {
        let d = dispatcher();
        let (status, headers, _) = send(&d, request("OPTIONS", "/"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["dav"], "1, 2");
        assert_eq!(headers["ms-author-via"], "DAV");

        let (status, headers, _) = send(&d, request("PATCH", "/"), "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[http::header::ALLOW], ALLOWED_METHODS);
    }

    #[tokio::test]
    async fn test_non_locking_backend() {
        let fs = MemFs::new().with_locking(false);
        let d = DavDispatcher::new(Arc::new(fs), Arc::new(LockManager::default()));
        send(&d, request("PUT", "/f"), "x").await;
        let (status, _, _) = send(&d, request("LOCK", "/f"), LOCKINFO).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        let (_, headers, _) = send(&d, request("OPTIONS", "/"), "").await;
        assert_eq!(headers["dav"], "1");
    }
}
