// Copyright 2023 ICON Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The source-chain receiver: subscribes to block notifications, fans out
//! header/votes/proof fetches, verifies headers against the validator set,
//! proves and filters event logs and emits receipts in strict height order.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use btp_relayer_types::{
    Address, BTPAddress, BlockHeader, BlockNotification, BlockRequest, Event, EventFilter,
    EventLog, Hash, HexInt, Message, ProofEventsParam, Receipt, SubscribeOptions, TxResult,
    ValidatorAddr,
};
use btp_relayer_utils::retry::RpcCallBackoff;
use btp_relayer_utils::{Error, Result};

use crate::client::ws::{MonitorHandler, WsEvent};
use crate::client::Client;
use crate::context::{RelayerContext, Shutdown};
use crate::mpt::mpt_prove;
use crate::verifier::{Verifier, VerifierOptions};

/// Signature of the BTP message event.
pub const EVENT_SIGNATURE: &str = "Message(str,int,bytes)";
const EVENT_INDEX_SIGNATURE: usize = 0;
const EVENT_INDEX_NEXT: usize = 1;
const EVENT_INDEX_SEQUENCE: usize = 2;

/// Upper bound on concurrent block fetches per subscription.
pub const MONITOR_BLOCK_MAX_CONCURRENCY: u64 = 300;

/// Sleep before reconnecting after the block monitor exits.
const MONITOR_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Receiver configuration, deserialized from raw JSON options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverOptions {
    /// Fan-out width and channel capacity; clamped to
    /// `[1, MONITOR_BLOCK_MAX_CONCURRENCY]`.
    #[serde(default)]
    pub sync_concurrency: u64,
    /// Light-client checkpoint; header verification is skipped when absent.
    #[serde(default)]
    pub verifier: Option<VerifierOptions>,
}

/// Raw-bytes form of the BTP event filter, precomputed once so fan-out
/// tasks compare slices only.
#[derive(Debug, Clone)]
struct EventLogFilter {
    addr: Vec<u8>,
    signature: Vec<u8>,
    next: Vec<u8>,
}

impl EventLogFilter {
    fn matches(&self, log: &EventLog, height: u64) -> bool {
        let addr_ok = log.addr == self.addr;
        let sig_ok = log
            .indexed
            .get(EVENT_INDEX_SIGNATURE)
            .is_some_and(|s| s == &self.signature);
        let next_ok = log
            .indexed
            .get(EVENT_INDEX_NEXT)
            .is_some_and(|n| n == &self.next);
        if !addr_ok {
            tracing::error!(
                height,
                got = %hex::encode(&log.addr),
                expected = %hex::encode(&self.addr),
                "invalid event: cannot match addr"
            );
        }
        if !sig_ok {
            tracing::error!(height, "invalid event: cannot match signature");
        }
        if !next_ok {
            tracing::error!(height, "invalid event: cannot match next");
        }
        addr_ok && sig_ok && next_ok
    }
}

/// Everything fetched and proven for one notified block.
struct BlockResult {
    height: u64,
    hash: Vec<u8>,
    header: BlockHeader,
    votes: Vec<u8>,
    next_validators: Option<Vec<ValidatorAddr>>,
    receipts: Vec<Receipt>,
}

/// Fetched header material during verifier catch-up.
struct SyncResult {
    height: u64,
    header: BlockHeader,
    votes: Vec<u8>,
    next_validators: Option<Vec<ValidatorAddr>>,
}

/// Pushes notifications from the websocket into the pipeline's bounded
/// channel; a full channel naturally slows the subscription down.
struct NotificationForwarder {
    bn_tx: mpsc::Sender<BlockNotification>,
}

#[async_trait::async_trait]
impl MonitorHandler<BlockNotification> for NotificationForwarder {
    async fn on_event(&mut self, event: WsEvent<BlockNotification>) -> Result<()> {
        match event {
            WsEvent::Init => Ok(()),
            WsEvent::Notification(bn) => {
                self.bn_tx.send(bn).await.map_err(|_| Error::Cancelled)
            }
            WsEvent::Err(err) => {
                tracing::debug!(error = %err, "monitor block error");
                Ok(())
            }
        }
    }
}

/// Watches one contract on one source chain and streams its BTP messages
/// in order.
#[derive(Debug)]
pub struct Receiver {
    src: BTPAddress,
    dst: BTPAddress,
    client: Arc<Client>,
    opts: ReceiverOptions,
    block_request: BlockRequest,
    filter: EventLogFilter,
}

impl Receiver {
    /// Builds a receiver for messages from `src` routed to `dst`, talking
    /// to the first of `urls`. `raw_opts` deserializes into
    /// [`ReceiverOptions`].
    pub fn new(src: BTPAddress, dst: BTPAddress, urls: &[String], raw_opts: Value) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::Setup("list of urls is empty"));
        }
        let client = Arc::new(Client::new(&urls[0])?);

        let mut opts: ReceiverOptions = serde_json::from_value(raw_opts)?;
        opts.sync_concurrency = opts
            .sync_concurrency
            .clamp(1, MONITOR_BLOCK_MAX_CONCURRENCY);

        let addr = Address::new(src.contract_address())?;
        let block_request = BlockRequest {
            height: HexInt::from_u64(0), // filled per subscription
            event_filters: vec![EventFilter {
                addr: Some(addr.clone()),
                signature: EVENT_SIGNATURE.to_string(),
                indexed: vec![Some(dst.to_string())],
            }],
        };
        let filter = EventLogFilter {
            addr: addr.to_bytes()?,
            signature: EVENT_SIGNATURE.as_bytes().to_vec(),
            next: dst.as_str().as_bytes().to_vec(),
        };

        Ok(Self {
            src,
            dst,
            client,
            opts,
            block_request,
            filter,
        })
    }

    /// The source contract this receiver watches.
    pub fn source(&self) -> &BTPAddress {
        &self.src
    }

    /// The destination messages are routed to.
    pub fn destination(&self) -> &BTPAddress {
        &self.dst
    }

    /// Starts the receive pipeline at the caller's checkpoint.
    ///
    /// Returns the ordered message stream and an error channel that closes
    /// after at most one terminal error. Context shutdown ends the stream
    /// cleanly with no error. The first delivered event carries sequence
    /// `opts.seq + 1`; `opts.height` is clamped to at least 1.
    pub async fn subscribe(
        self: &Arc<Self>,
        ctx: &RelayerContext,
        opts: SubscribeOptions,
    ) -> Result<(mpsc::Receiver<Message>, mpsc::Receiver<Error>)> {
        let start_seq = opts.seq + 1;
        let start_height = opts.height.max(1);

        let verifier = match &self.opts.verifier {
            Some(vopts) => Some(self.new_verifier(vopts).await?),
            None => None,
        };

        let capacity = self.opts.sync_concurrency as usize;
        let (msg_tx, msg_rx) = mpsc::channel(capacity);
        let (err_tx, err_rx) = mpsc::channel(1);

        let this = Arc::clone(self);
        let shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            match this
                .receive_loop(shutdown, verifier, start_height, start_seq, msg_tx)
                .await
            {
                Ok(()) => {}
                Err(err) => {
                    tracing::error!(error = %err, "receive loop terminated");
                    let _ = err_tx.send(err).await;
                }
            }
            // err_tx drops here, closing the error channel
        });

        Ok((msg_rx, err_rx))
    }

    /// Bootstraps the verifier from its checkpoint: fetch and hash-check
    /// the validator set, then verify the checkpoint header. Failure here
    /// is fatal to the subscription.
    async fn new_verifier(&self, opts: &VerifierOptions) -> Result<Verifier> {
        let validators = self.client.get_validators_by_hash(&opts.validators_hash).await?;
        let verifier = Verifier::new(opts.block_height, opts.validators_hash, validators);
        let header = self.client.get_block_header(verifier.next()).await?;
        let votes = self.client.get_votes_by_height(verifier.next()).await?;
        verifier.verify(&header, &votes)?;
        Ok(verifier)
    }

    async fn receive_loop(
        &self,
        mut shutdown: Shutdown,
        mut verifier: Option<Verifier>,
        start_height: u64,
        start_seq: u64,
        msg_tx: mpsc::Sender<Message>,
    ) -> Result<()> {
        let capacity = self.opts.sync_concurrency as usize;
        let (bn_tx, mut bn_rx) = mpsc::channel::<BlockNotification>(capacity);
        let (reconnect_tx, mut reconnect_rx) = mpsc::channel::<()>(1);

        let mut pending: VecDeque<BlockResult> = VecDeque::new();
        let mut next = start_height;
        let mut next_seq = start_seq;
        let mut monitor_task: Option<JoinHandle<()>> = None;

        let _ = reconnect_tx.try_send(());

        loop {
            // release the contiguous prefix of fetched results
            while pending.front().is_some_and(|r| r.height == next) {
                let Some(result) = pending.pop_front() else { break };
                tracing::debug!(height = result.height, "block notification");
                if let Some(vr) = verifier.as_mut() {
                    if let Err(err) = vr.verify(&result.header, &result.votes) {
                        tracing::error!(
                            height = result.height,
                            hash = %hex::encode(&result.hash),
                            error = %err,
                            "reconnect: verification failed"
                        );
                        signal_reconnect(&reconnect_tx);
                        break;
                    }
                    if let Err(err) = vr.update(&result.header, result.next_validators) {
                        self.stop_monitor(&mut monitor_task);
                        return Err(err);
                    }
                }
                match self.deliver(result.receipts, &mut next_seq, &msg_tx).await {
                    Ok(true) => {}
                    Ok(false) => {
                        self.stop_monitor(&mut monitor_task);
                        return Ok(());
                    }
                    Err(err) => {
                        self.stop_monitor(&mut monitor_task);
                        return Err(err);
                    }
                }
                next += 1;
            }

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    self.stop_monitor(&mut monitor_task);
                    return Ok(());
                }

                _ = reconnect_rx.recv() => {
                    // cancel the subscription before draining, or the
                    // drain races with new notifications
                    self.stop_monitor(&mut monitor_task);
                    while bn_rx.try_recv().is_ok() {}
                    pending.clear();

                    monitor_task = Some(self.spawn_monitor(
                        next,
                        bn_tx.clone(),
                        reconnect_tx.clone(),
                    ));

                    if let Some(vr) = verifier.as_mut() {
                        if let Err(err) = self.sync_verifier(vr, next).await {
                            self.stop_monitor(&mut monitor_task);
                            return Err(err);
                        }
                    }
                }

                maybe_bn = bn_rx.recv() => {
                    let Some(first) = maybe_bn else { continue };
                    let mut batch = vec![first];
                    while batch.len() < capacity {
                        match bn_rx.try_recv() {
                            Ok(bn) => batch.push(bn),
                            Err(_) => break,
                        }
                    }
                    if !self.batch_heights_contiguous(&batch, next) {
                        signal_reconnect(&reconnect_tx);
                        continue;
                    }

                    let known_hashes = verifier
                        .as_ref()
                        .map(|vr| vr.known_validator_hashes());
                    let results = self.fetch_batch(batch, known_hashes).await;

                    let complete = results.iter().all(Option::is_some);
                    let mut fetched: Vec<BlockResult> =
                        results.into_iter().flatten().collect();
                    fetched.sort_by_key(|r| r.height);
                    for (i, result) in fetched.into_iter().enumerate() {
                        if result.height == next + i as u64 {
                            pending.push_back(result);
                        }
                    }
                    if !complete {
                        // a hole would stall this height forever; refetch
                        // everything after the released prefix
                        signal_reconnect(&reconnect_tx);
                    }
                }
            }
        }
    }

    fn batch_heights_contiguous(&self, batch: &[BlockNotification], next: u64) -> bool {
        for (i, bn) in batch.iter().enumerate() {
            let expected = next + i as u64;
            match bn.height.to_u64() {
                Ok(height) if height == expected => {}
                Ok(height) => {
                    tracing::error!(
                        got = height,
                        expected,
                        "reconnect: missing block notification"
                    );
                    return false;
                }
                Err(err) => {
                    tracing::error!(error = %err, "reconnect: bad notification height");
                    return false;
                }
            }
        }
        true
    }

    fn spawn_monitor(
        &self,
        height: u64,
        bn_tx: mpsc::Sender<BlockNotification>,
        reconnect_tx: mpsc::Sender<()>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let mut request = self.block_request.clone();
        request.height = HexInt::from_u64(height);
        tokio::spawn(async move {
            let mut handler = NotificationForwarder { bn_tx };
            if let Err(err) = client.monitor_block(&request, &mut handler).await {
                tracing::error!(error = %err, "reconnect: monitor block error");
            }
            // whether the peer closed or the read failed, retry after a
            // pause; shutdown aborts this task before the signal matters
            tokio::time::sleep(MONITOR_RETRY_DELAY).await;
            signal_reconnect(&reconnect_tx);
        })
    }

    fn stop_monitor(&self, monitor_task: &mut Option<JoinHandle<()>>) {
        if let Some(task) = monitor_task.take() {
            task.abort();
        }
        self.client.close_all_monitors();
    }

    async fn fetch_batch(
        &self,
        batch: Vec<BlockNotification>,
        known_hashes: Option<HashSet<Hash>>,
    ) -> Vec<Option<BlockResult>> {
        let handles: Vec<JoinHandle<std::result::Result<BlockResult, Error>>> = batch
            .into_iter()
            .map(|bn| {
                let client = Arc::clone(&self.client);
                let filter = self.filter.clone();
                let known = known_hashes.clone();
                tokio::spawn(async move {
                    let op = || {
                        let client = Arc::clone(&client);
                        let filter = filter.clone();
                        let bn = bn.clone();
                        let known = known.clone();
                        async move {
                            fetch_block_result(client, filter, bn, known)
                                .await
                                .map_err(backoff::Error::transient)
                        }
                    };
                    backoff::future::retry(RpcCallBackoff::new(), op).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(result)) => results.push(Some(result)),
                Ok(Err(err)) => {
                    tracing::debug!(error = %err, "receive loop: fetch error");
                    results.push(None);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "receive loop: fetch task failed");
                    results.push(None);
                }
            }
        }
        results
    }

    /// Applies the sequence policy and forwards non-empty receipts.
    /// Returns `false` when the subscriber has gone away.
    async fn deliver(
        &self,
        receipts: Vec<Receipt>,
        next_seq: &mut u64,
        msg_tx: &mpsc::Sender<Message>,
    ) -> Result<bool> {
        let mut out = Vec::new();
        for mut receipt in receipts {
            let mut events = Vec::new();
            for event in receipt.events {
                if event.sequence == *next_seq {
                    *next_seq += 1;
                    events.push(event);
                } else if event.sequence > *next_seq {
                    tracing::error!(
                        got = event.sequence,
                        expected = *next_seq,
                        "invalid event seq"
                    );
                    return Err(Error::InvalidEventSequence {
                        got: event.sequence,
                        expected: *next_seq,
                    });
                }
                // sequences below expected were delivered by an earlier run
            }
            if !events.is_empty() {
                receipt.events = events;
                out.push(receipt);
            }
        }
        if out.is_empty() {
            return Ok(true);
        }
        Ok(msg_tx.send(Message { receipts: out }).await.is_ok())
    }

    /// Catches the verifier up to `target` without event extraction.
    /// Verification failure here is fatal.
    async fn sync_verifier(&self, verifier: &mut Verifier, target: u64) -> Result<()> {
        if verifier.next() == target {
            return Ok(());
        }
        if verifier.next() > target {
            return Err(Error::InvalidTargetHeight {
                next: verifier.next(),
                target,
            });
        }

        tracing::info!(height = verifier.next(), target, "sync verifier: start");
        while verifier.next() < target {
            let count = (target - verifier.next()).min(self.opts.sync_concurrency);
            let known = verifier.known_validator_hashes();
            let handles: Vec<JoinHandle<std::result::Result<SyncResult, Error>>> =
                (verifier.next()..verifier.next() + count)
                    .map(|height| {
                        let client = Arc::clone(&self.client);
                        let known = known.clone();
                        tokio::spawn(async move {
                            let op = || {
                                let client = Arc::clone(&client);
                                let known = known.clone();
                                async move {
                                    fetch_sync_result(client, height, known)
                                        .await
                                        .map_err(backoff::Error::transient)
                                }
                            };
                            backoff::future::retry(RpcCallBackoff::new(), op).await
                        })
                    })
                    .collect();

            let mut fetched = Vec::with_capacity(handles.len());
            for joined in join_all(handles).await {
                match joined {
                    Ok(Ok(result)) => fetched.push(result),
                    Ok(Err(err)) => {
                        tracing::debug!(error = %err, "sync verifier: fetch error")
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "sync verifier: fetch task failed")
                    }
                }
            }
            fetched.sort_by_key(|r| r.height);
            for result in fetched {
                if verifier.next() == result.height {
                    verifier.verify(&result.header, &result.votes)?;
                    verifier.update(&result.header, result.next_validators)?;
                }
            }
            tracing::debug!(height = verifier.next(), target, "sync verifier: syncing");
        }
        tracing::info!(height = verifier.next(), "sync verifier: complete");
        Ok(())
    }
}

fn signal_reconnect(reconnect_tx: &mpsc::Sender<()>) {
    // capacity 1: concurrent requests collapse into a single signal
    let _ = reconnect_tx.try_send(());
}

async fn fetch_sync_result(
    client: Arc<Client>,
    height: u64,
    known_hashes: HashSet<Hash>,
) -> Result<SyncResult> {
    let header = client.get_block_header(height).await?;
    let votes = client.get_votes_by_height(height).await?;
    let next_validators = if known_hashes.contains(&header.next_validators_hash) {
        None
    } else {
        Some(client.get_validators_by_hash(&header.next_validators_hash).await?)
    };
    Ok(SyncResult {
        height,
        header,
        votes,
        next_validators,
    })
}

async fn fetch_block_result(
    client: Arc<Client>,
    filter: EventLogFilter,
    bn: BlockNotification,
    known_hashes: Option<HashSet<Hash>>,
) -> Result<BlockResult> {
    let height = bn.height.to_u64()?;
    let hash = bn.hash.value()?;

    let header = client.get_block_header(height).await?;
    let mut votes = Vec::new();
    let mut next_validators = None;
    if let Some(known) = &known_hashes {
        votes = client.get_votes_by_height(height).await?;
        if !known.contains(&header.next_validators_hash) {
            next_validators =
                Some(client.get_validators_by_hash(&header.next_validators_hash).await?);
        }
    }

    let mut receipts = Vec::new();
    if !bn.indexes.is_empty() && !bn.events.is_empty() {
        let header_result = header.header_result()?;
        for (i, index) in bn.indexes[0].iter().enumerate() {
            let event_indexes = bn
                .events[0]
                .get(i)
                .ok_or(Error::Setup("notification events do not cover all indexes"))?;
            let proofs = client
                .get_proof_for_events(&ProofEventsParam {
                    index: index.clone(),
                    block_hash: bn.hash.clone(),
                    events: event_indexes.clone(),
                })
                .await?;
            if proofs.len() != 1 + event_indexes.len() {
                return Err(Error::MissingProofs {
                    got: proofs.len(),
                    expected: 1 + event_indexes.len(),
                });
            }

            let receipt_index = index.to_u64()?;
            let receipt_key = rlp::encode(&receipt_index).to_vec();
            let serialized_receipt =
                mpt_prove(&receipt_key, &proofs[0], &header_result.receipt_hash)?;
            let tx_result = TxResult::from_bytes(&serialized_receipt)?;

            let mut receipt = Receipt {
                index: receipt_index,
                height,
                events: Vec::new(),
            };
            for (j, event_index) in event_indexes.iter().enumerate() {
                let event_key = rlp::encode(&event_index.to_u64()?).to_vec();
                let serialized_log =
                    mpt_prove(&event_key, &proofs[j + 1], &tx_result.event_logs_hash)?;
                let log: EventLog = rlp::decode(&serialized_log)?;
                if !filter.matches(&log, height) {
                    return Err(Error::InvalidEvent);
                }
                receipt.events.push(Event {
                    next: BTPAddress::new(
                        String::from_utf8(log.indexed[EVENT_INDEX_NEXT].clone())
                            .map_err(|_| Error::InvalidEvent)?,
                    )?,
                    sequence: parse_sequence(&log.indexed[EVENT_INDEX_SEQUENCE])?,
                    message: log.data.first().cloned().ok_or(Error::InvalidEvent)?,
                });
            }
            if !receipt.events.is_empty() {
                receipts.push(receipt);
            }
        }
    }

    Ok(BlockResult {
        height,
        hash,
        header,
        votes,
        next_validators,
        receipts,
    })
}

/// Decodes the big-endian sequence bytes of the event's third indexed
/// field.
fn parse_sequence(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(Error::InvalidEvent);
    }
    Ok(bytes.iter().fold(0u64, |acc, b| acc << 8 | u64::from(*b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn receiver_with(raw_opts: Value) -> Receiver {
        Receiver::new(
            BTPAddress::new("btp://0x1.icon/cxf285a0b159145dfbedb4dd0d1d9eda0db9a5ba44")
                .unwrap(),
            BTPAddress::new("btp://0x5.pra/dst").unwrap(),
            &["http://localhost:9080/api/v3".to_string()],
            raw_opts,
        )
        .unwrap()
    }

    #[test]
    fn concurrency_is_clamped_into_range() {
        assert_eq!(receiver_with(json!({})).opts.sync_concurrency, 1);
        assert_eq!(
            receiver_with(json!({ "syncConcurrency": 0 })).opts.sync_concurrency,
            1
        );
        assert_eq!(
            receiver_with(json!({ "syncConcurrency": 77 })).opts.sync_concurrency,
            77
        );
        assert_eq!(
            receiver_with(json!({ "syncConcurrency": 9999 })).opts.sync_concurrency,
            MONITOR_BLOCK_MAX_CONCURRENCY
        );
    }

    #[test]
    fn empty_url_list_is_a_setup_error() {
        let result = Receiver::new(
            BTPAddress::new("btp://0x1.icon/cx0000000000000000000000000000000000000000")
                .unwrap(),
            BTPAddress::new("btp://0x5.pra/dst").unwrap(),
            &[],
            json!({}),
        );
        assert!(matches!(result.unwrap_err(), Error::Setup(_)));
    }

    #[test]
    fn block_request_carries_the_btp_filter() {
        let receiver = receiver_with(json!({}));
        let filters = &receiver.block_request.event_filters;
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].signature, EVENT_SIGNATURE);
        assert_eq!(filters[0].indexed[0].as_deref(), Some("btp://0x5.pra/dst"));
    }

    #[test]
    fn filter_matches_on_all_three_fields() {
        let receiver = receiver_with(json!({}));
        let good = EventLog {
            addr: receiver.filter.addr.clone(),
            indexed: vec![
                EVENT_SIGNATURE.as_bytes().to_vec(),
                b"btp://0x5.pra/dst".to_vec(),
                vec![0x07],
            ],
            data: vec![vec![0xde, 0xad]],
        };
        assert!(receiver.filter.matches(&good, 100));

        let mut wrong_addr = good.clone();
        wrong_addr.addr = vec![0x00; 21];
        assert!(!receiver.filter.matches(&wrong_addr, 100));

        let mut wrong_sig = good.clone();
        wrong_sig.indexed[0] = b"Other(str)".to_vec();
        assert!(!receiver.filter.matches(&wrong_sig, 100));

        let mut wrong_next = good;
        wrong_next.indexed[1] = b"btp://0x6.eth/dst".to_vec();
        assert!(!receiver.filter.matches(&wrong_next, 100));
    }

    #[test]
    fn sequence_bytes_decode_big_endian() {
        assert_eq!(parse_sequence(&[]).unwrap(), 0);
        assert_eq!(parse_sequence(&[0x07]).unwrap(), 7);
        assert_eq!(parse_sequence(&[0x01, 0x00]).unwrap(), 256);
        assert_eq!(
            parse_sequence(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap(),
            u64::MAX
        );
        assert!(parse_sequence(&[0x01; 9]).is_err());
    }

    fn receipt(height: u64, index: u64, seqs: &[u64]) -> Receipt {
        Receipt {
            index,
            height,
            events: seqs
                .iter()
                .map(|&sequence| Event {
                    next: BTPAddress::new("btp://0x5.pra/dst").unwrap(),
                    sequence,
                    message: vec![0xde, 0xad],
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn deliver_enforces_the_sequence_policy() {
        let receiver = receiver_with(json!({}));
        let (msg_tx, mut msg_rx) = mpsc::channel(4);
        let mut next_seq = 7;

        // seq 5, 6 were delivered by an earlier run; 7 and 8 are new
        let receipts = vec![receipt(100, 0, &[5, 6, 7, 8])];
        assert!(receiver.deliver(receipts, &mut next_seq, &msg_tx).await.unwrap());
        assert_eq!(next_seq, 9);
        let msg = msg_rx.try_recv().unwrap();
        assert_eq!(msg.receipts.len(), 1);
        let seqs: Vec<u64> = msg.receipts[0].events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![7, 8]);
    }

    #[tokio::test]
    async fn deliver_drops_entirely_stale_receipts() {
        let receiver = receiver_with(json!({}));
        let (msg_tx, mut msg_rx) = mpsc::channel(4);
        let mut next_seq = 10;

        let receipts = vec![receipt(100, 0, &[8, 9])];
        assert!(receiver.deliver(receipts, &mut next_seq, &msg_tx).await.unwrap());
        assert_eq!(next_seq, 10);
        assert!(msg_rx.try_recv().is_err()); // nothing delivered
    }

    #[tokio::test]
    async fn deliver_fails_on_a_sequence_jump() {
        let receiver = receiver_with(json!({}));
        let (msg_tx, _msg_rx) = mpsc::channel(4);
        let mut next_seq = 7;

        let receipts = vec![receipt(100, 0, &[9])];
        let err = receiver
            .deliver(receipts, &mut next_seq, &msg_tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEventSequence { got: 9, expected: 7 }
        ));
    }

    fn notification(height: u64) -> BlockNotification {
        serde_json::from_value(json!({
            "hash": "0xaa",
            "height": format!("{height:#x}"),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn forwarder_applies_backpressure_when_the_channel_is_full() {
        let (bn_tx, mut bn_rx) = mpsc::channel(2);
        let mut forwarder = NotificationForwarder { bn_tx };
        for height in [100u64, 101] {
            forwarder
                .on_event(WsEvent::Notification(notification(height)))
                .await
                .unwrap();
        }

        // both slots taken: the monitor cannot push until the pipeline drains
        let mut push = Box::pin(forwarder.on_event(WsEvent::Notification(notification(102))));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut push)
                .await
                .is_err()
        );

        assert_eq!(bn_rx.recv().await.unwrap().height.to_u64().unwrap(), 100);
        push.await.unwrap();
        assert_eq!(bn_rx.recv().await.unwrap().height.to_u64().unwrap(), 101);
        assert_eq!(bn_rx.recv().await.unwrap().height.to_u64().unwrap(), 102);
    }

    #[tokio::test]
    async fn deliver_blocks_while_the_subscriber_stalls() {
        let receiver = receiver_with(json!({ "syncConcurrency": 2 }));
        let (msg_tx, mut msg_rx) = mpsc::channel(2);
        let mut next_seq = 7;
        for (height, seq) in [(100u64, 7u64), (101, 8)] {
            assert!(receiver
                .deliver(vec![receipt(height, 0, &[seq])], &mut next_seq, &msg_tx)
                .await
                .unwrap());
        }

        // the channel is at capacity: delivery parks instead of buffering
        let mut stalled =
            Box::pin(receiver.deliver(vec![receipt(102, 0, &[9])], &mut next_seq, &msg_tx));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut stalled)
                .await
                .is_err()
        );

        // draining one message frees the slot and the delivery completes
        assert_eq!(msg_rx.recv().await.unwrap().receipts[0].height, 100);
        assert!(stalled.await.unwrap());
        assert_eq!(msg_rx.recv().await.unwrap().receipts[0].height, 101);
        assert_eq!(msg_rx.recv().await.unwrap().receipts[0].height, 102);
    }

    #[tokio::test]
    async fn deliver_reports_a_closed_subscriber() {
        let receiver = receiver_with(json!({}));
        let (msg_tx, msg_rx) = mpsc::channel(1);
        drop(msg_rx);
        let mut next_seq = 7;
        let delivered = receiver
            .deliver(vec![receipt(100, 0, &[7])], &mut next_seq, &msg_tx)
            .await
            .unwrap();
        assert!(!delivered);
    }

    #[test]
    fn contiguous_batch_heights_pass() {
        let receiver = receiver_with(json!({}));
        let batch: Vec<BlockNotification> = [100u64, 101, 102]
            .iter()
            .map(|&h| {
                serde_json::from_value(json!({
                    "hash": "0xaa",
                    "height": format!("{:#x}", h),
                }))
                .unwrap()
            })
            .collect();
        assert!(receiver.batch_heights_contiguous(&batch, 100));
        assert!(!receiver.batch_heights_contiguous(&batch, 99));
    }

    #[test]
    fn gapped_batch_heights_fail() {
        let receiver = receiver_with(json!({}));
        let batch: Vec<BlockNotification> = [100u64, 102]
            .iter()
            .map(|&h| {
                serde_json::from_value(json!({
                    "hash": "0xaa",
                    "height": format!("{:#x}", h),
                }))
                .unwrap()
            })
            .collect();
        assert!(!receiver.batch_heights_contiguous(&batch, 100));
    }
}
