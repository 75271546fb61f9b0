//! Single-threaded apartment
//!
//! Every call is posted to one queue and run to completion by a single task
//! before the next one starts. Objects living here never see overlapping
//! calls. Creating an STA spawns its queue task, so it needs a tokio runtime.

use super::apartment::{rejected, start_call, Apartment, ApartmentId, ApartmentType, CallFuture, CallResult, ComObject, ObjectMap};
use crate::types::{DcomError, Iid, Oid};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

const QUEUE_DEPTH: usize = 1024;

struct StaMessage {
    oid: Oid,
    iid: Iid,
    opnum: u16,
    args: Bytes,
    reply: oneshot::Sender<CallResult>,
}

pub struct SinglethreadedApartment {
    id: ApartmentId,
    objects: Arc<ObjectMap>,
    sender: Mutex<Option<mpsc::Sender<StaMessage>>>,
    running: Arc<AtomicBool>,
}

impl SinglethreadedApartment {
    pub fn new() -> Self {
        Self::with_id(ApartmentId::generate())
    }

    pub fn with_id(id: ApartmentId) -> Self {
        let sta = Self {
            id,
            objects: Arc::new(ObjectMap::default()),
            sender: Mutex::new(None),
            running: Arc::new(AtomicBool::new(true)),
        };
        sta.start_message_loop();
        sta
    }

    fn start_message_loop(&self) {
        let (tx, mut rx) = mpsc::channel::<StaMessage>(QUEUE_DEPTH);
        *self.sender.lock() = Some(tx);

        let objects = self.objects.clone();
        let running = self.running.clone();
        let id = self.id;

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let result = if running.load(Ordering::SeqCst) {
                    trace!(apartment = id.0, oid = %msg.oid, opnum = msg.opnum, "STA call");
                    start_call(&objects, msg.oid, msg.iid, msg.opnum, msg.args).await
                } else {
                    Err(DcomError::ApartmentShutdown)
                };
                // The caller may have given up waiting
                let _ = msg.reply.send(result);
            }
            debug!(apartment = id.0, "STA queue closed");
        });
    }
}

impl Default for SinglethreadedApartment {
    fn default() -> Self {
        Self::new()
    }
}

impl Apartment for SinglethreadedApartment {
    fn id(&self) -> ApartmentId {
        self.id
    }

    fn apartment_type(&self) -> ApartmentType {
        ApartmentType::Sta
    }

    fn register_object(&self, object: Arc<dyn ComObject>) -> Oid {
        let oid = object.oid();
        self.objects.write().insert(oid, object);
        oid
    }

    fn unregister_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>> {
        self.objects.write().remove(oid)
    }

    fn get_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>> {
        self.objects.read().get(oid).cloned()
    }

    fn dispatch(&self, oid: Oid, iid: Iid, opnum: u16, args: Bytes) -> CallFuture {
        if !self.is_running() {
            return rejected();
        }
        let Some(tx) = self.sender.lock().clone() else {
            return rejected();
        };

        let (reply, response) = oneshot::channel();
        let msg = StaMessage { oid, iid, opnum, args, reply };
        Box::pin(async move {
            tx.send(msg).await.map_err(|_| DcomError::ApartmentShutdown)?;
            response.await.map_err(|_| DcomError::ApartmentShutdown)?
        })
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.sender.lock().take();
        let dropped = std::mem::take(&mut *self.objects.write());
        debug!(apartment = self.id.0, objects = dropped.len(), "STA shut down");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
