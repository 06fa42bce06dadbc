//! gRPC surface of the block tier.
//!
//! Put segments the inbound stream and fans block persistence out to
//! parallel tasks; Get serves whole blocks through the read cache and
//! slices in memory; Delete goes straight to the object store. Inspect and
//! List are reserved surface.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use river_object_client::{retry_notify, ObjectClient, ObjectError, RetryConfig};
use river_proto::block::block_api_server::BlockApi;
use river_proto::block::{
    Block, BlockInfo, BlockInfos, BlockRef, BlockRefs, ByteRange, DeleteBlockRequest,
    DeleteBlockResponse, Delimiter, GetBlockRequest, GetBlockResponse, InspectBlockRequest,
    ListBlockRequest, PutBlockRequest,
};
use tokio::task::JoinSet;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use crate::cache::BlockCache;
use crate::local_store::{block_hash, block_path};
use crate::segment::{Segmenter, BLOCK_SIZE};

pub struct BlockServer {
    client: Arc<dyn ObjectClient>,
    cache: BlockCache,
}

impl BlockServer {
    pub fn new(client: Arc<dyn ObjectClient>, cache_bytes: u64) -> Self {
        let cache = BlockCache::new(client.clone(), cache_bytes);
        BlockServer { client, cache }
    }

    /// Segments the stream, persists each block, and returns the refs in
    /// stream order. Callers must drain `stream` afterwards; a mid-stream
    /// failure leaves frames behind.
    async fn put_block_inner<S>(&self, stream: &mut S) -> Result<BlockRefs, Status>
    where
        S: Stream<Item = Result<PutBlockRequest, Status>> + Unpin,
    {
        let first = match stream.next().await {
            None => return Ok(BlockRefs::default()),
            Some(frame) => frame?,
        };
        let delimiter = Delimiter::try_from(first.delimiter)
            .map_err(|_| Status::invalid_argument("unknown delimiter"))?;

        let mut segmenter = Segmenter::new(delimiter, first.value);
        let mut tasks: JoinSet<Result<(), ObjectError>> = JoinSet::new();
        let mut refs = Vec::new();

        loop {
            let segment = match segmenter.next_segment(stream).await {
                Ok(segment) => segment,
                Err(status) => {
                    // Let already-spawned writes run to completion instead
                    // of aborting them mid-flight with the failing RPC.
                    while tasks.join_next().await.is_some() {}
                    return Err(status);
                }
            };
            let hash = block_hash(&segment.data);
            let done = segment.data.len() < BLOCK_SIZE;

            refs.push(BlockRef {
                block: Some(Block { hash: hash.clone() }),
                range: Some(ByteRange {
                    lower: segment.lower,
                    upper: segment.upper,
                }),
            });

            let client = self.client.clone();
            let data = segment.data;
            tasks.spawn(async move { persist_block(client, hash, data).await });

            if done {
                break;
            }
        }

        // Await every persistence task; the first terminal error fails the
        // RPC, but only after the rest have settled.
        let mut first_err: Option<Status> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => {
                    first_err
                        .get_or_insert_with(|| Status::internal(format!("persist task failed: {join_err}")));
                    continue;
                }
            };
            if let Err(err) = result {
                first_err.get_or_insert_with(|| status_from(err));
            }
        }
        match first_err {
            Some(status) => Err(status),
            None => Ok(BlockRefs { block_ref: refs }),
        }
    }

    async fn get_block_inner(&self, request: &GetBlockRequest) -> Result<Bytes, Status> {
        let hash = &request
            .block
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("missing block"))?
            .hash;
        let data = self.cache.get(hash).await.map_err(status_from)?;
        Ok(slice_block(&data, request.offset_bytes, request.size_bytes))
    }

    async fn delete_block_inner(&self, request: &DeleteBlockRequest) -> Result<(), Status> {
        let hash = &request
            .block
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("missing block"))?
            .hash;
        let key = block_path(hash);
        let client = self.client.clone();

        retry_notify(
            &RetryConfig::exponential(),
            || async {
                match client.delete(&key).await {
                    // A missing block is already deleted.
                    Err(err) if !client.is_not_exist(&err) => Err(err),
                    _ => Ok(()),
                }
            },
            |err| client.is_retryable(err),
            |err, delay| {
                info!(
                    error = %err,
                    time_till_next_retry = ?delay,
                    "error deleting block; retrying"
                );
            },
        )
        .await
        .map_err(status_from)
    }
}

/// Persist one block, skipping the write when the key already exists:
/// blocks are content-addressed, so an existing object is the same block,
/// and skipping keeps us under object store rate limits.
async fn persist_block(
    client: Arc<dyn ObjectClient>,
    hash: String,
    data: Bytes,
) -> Result<(), ObjectError> {
    let key = block_path(&hash);
    retry_notify(
        &RetryConfig::exponential(),
        || async {
            if client.exists(&key).await? {
                return Ok(());
            }
            client.write(&key, data.clone()).await
        },
        |err| client.is_retryable(err),
        |err, delay| {
            info!(
                error = %err,
                time_till_next_retry = ?delay,
                "error writing block; retrying"
            );
        },
    )
    .await
}

/// Slicing rules for Get: a `size` of 0 means "to the end"; ranges falling
/// past the block yield empty bytes rather than an error.
fn slice_block(data: &Bytes, offset: u64, size: u64) -> Bytes {
    let len = data.len() as u64;
    if size != 0 && offset + size < len {
        data.slice(offset as usize..(offset + size) as usize)
    } else if offset < len {
        data.slice(offset as usize..)
    } else {
        Bytes::new()
    }
}

fn status_from(err: ObjectError) -> Status {
    match err {
        ObjectError::NotFound { key } => Status::not_found(format!("object not found: {key}")),
        other => Status::internal(other.to_string()),
    }
}

/// Consume whatever the client still has in flight so its send side is
/// never left blocked, even when the RPC has already failed.
async fn drain<S>(stream: &mut S)
where
    S: Stream<Item = Result<PutBlockRequest, Status>> + Unpin,
{
    while matches!(stream.next().await, Some(Ok(_))) {}
}

#[tonic::async_trait]
impl BlockApi for BlockServer {
    type GetBlockStream =
        Pin<Box<dyn Stream<Item = Result<GetBlockResponse, Status>> + Send + 'static>>;

    async fn put_block(
        &self,
        request: Request<Streaming<PutBlockRequest>>,
    ) -> Result<Response<BlockRefs>, Status> {
        let mut stream = request.into_inner();
        let result = self.put_block_inner(&mut stream).await;
        drain(&mut stream).await;
        if let Err(status) = &result {
            warn!(error = %status, "PutBlock failed");
        }
        result.map(Response::new)
    }

    async fn get_block(
        &self,
        request: Request<GetBlockRequest>,
    ) -> Result<Response<Self::GetBlockStream>, Status> {
        let request = request.into_inner();
        let value = self.get_block_inner(&request).await?;
        // Blocks are bounded by BLOCK_SIZE, so one frame carries any block.
        let frames = futures::stream::iter([Ok(GetBlockResponse {
            value: value.to_vec(),
        })]);
        Ok(Response::new(Box::pin(frames)))
    }

    async fn delete_block(
        &self,
        request: Request<DeleteBlockRequest>,
    ) -> Result<Response<DeleteBlockResponse>, Status> {
        self.delete_block_inner(&request.into_inner()).await?;
        Ok(Response::new(DeleteBlockResponse {}))
    }

    async fn inspect_block(
        &self,
        _request: Request<InspectBlockRequest>,
    ) -> Result<Response<BlockInfo>, Status> {
        Err(Status::unimplemented("not implemented"))
    }

    async fn list_block(
        &self,
        _request: Request<ListBlockRequest>,
    ) -> Result<Response<BlockInfos>, Status> {
        Err(Status::unimplemented("not implemented"))
    }
}
