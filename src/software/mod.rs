//! CPU implementation of the adapter: device memory, the command stream
//! recorded by `CommandList` and the per-queue worker threads that execute
//! it.

use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, trace, warn};

use crate::enum_wrappers::*;
use crate::struct_wrappers::*;
use crate::{
    CpuDescriptorHandle, DescriptorHeap, DeviceInner, Fence, GpuDescriptorHandle,
    PipelineState, Resource, RootSignature,
};

mod executor;
pub(crate) mod memory;
pub(crate) mod texel;

pub(crate) use executor::Executor;

/// Poisoned locks only mean another thread panicked mid-update; the data
/// they guard is still plain bytes and counters.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stores a validation message in the device's info queue
pub(crate) fn report(
    device: &DeviceInner,
    severity: MessageSeverity,
    category: MessageCategory,
    description: String,
) {
    match severity {
        MessageSeverity::Corruption | MessageSeverity::Error => {
            error!("[{}] {}", device.adapter.description, description)
        }
        MessageSeverity::Warning => {
            warn!("[{}] {}", device.adapter.description, description)
        }
        MessageSeverity::Info | MessageSeverity::Message => {
            debug!("[{}] {}", device.adapter.description, description)
        }
    }
    lock(&device.messages).push(Message {
        category,
        severity,
        description,
    });
}

#[derive(Clone, Debug)]
pub(crate) struct TransitionRecord {
    pub(crate) resource: Resource,
    pub(crate) before: ResourceStates,
    pub(crate) after: ResourceStates,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BindPoint {
    Graphics,
    Compute,
}

#[derive(Clone)]
pub(crate) enum Command {
    Barriers(Vec<TransitionRecord>),
    ClearRenderTarget {
        rtv: CpuDescriptorHandle,
        color: [f32; 4],
    },
    ClearDepthStencil {
        dsv: CpuDescriptorHandle,
        depth: f32,
    },
    CopyResource {
        dest: Resource,
        source: Resource,
    },
    CopyTextureRegion {
        dest: TextureCopyLocation,
        source: TextureCopyLocation,
    },
    SetPipelineState(PipelineState),
    SetRootSignature {
        bind_point: BindPoint,
        root_signature: RootSignature,
    },
    SetDescriptorHeaps(Vec<DescriptorHeap>),
    SetRootConstantBufferView {
        bind_point: BindPoint,
        index: u32,
        address: GpuVirtualAddress,
    },
    SetRoot32BitConstant {
        bind_point: BindPoint,
        index: u32,
        value: u32,
        offset: u32,
    },
    SetRootDescriptorTable {
        bind_point: BindPoint,
        index: u32,
        base: GpuDescriptorHandle,
    },
    SetRenderTargets {
        rtvs: Vec<CpuDescriptorHandle>,
        dsv: Option<CpuDescriptorHandle>,
    },
    SetViewports(Vec<Viewport>),
    SetScissorRects(Vec<Rect>),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch([u32; 3]),
}

pub(crate) enum QueueOp {
    Execute(Vec<Arc<Vec<Command>>>),
    Signal(Fence, u64),
    Wait(Fence, u64),
    Shutdown,
}

/// Body of a command queue's worker thread. Operations run strictly in
/// submission order, which is all the ordering a single queue promises.
pub(crate) fn run_queue(
    device: Arc<DeviceInner>,
    queue_name: String,
    operations: Receiver<QueueOp>,
    shutting_down: Arc<AtomicBool>,
) {
    trace!("Queue '{}' worker started", queue_name);
    while let Ok(operation) = operations.recv() {
        match operation {
            QueueOp::Execute(lists) => {
                for commands in &lists {
                    Executor::new(&device).run(commands);
                }
            }
            QueueOp::Signal(fence, value) => fence.complete(value),
            QueueOp::Wait(fence, value) => {
                if !fence.block_until(value, &shutting_down) {
                    break;
                }
            }
            QueueOp::Shutdown => break,
        }
    }
    trace!("Queue '{}' worker finished", queue_name);
}
