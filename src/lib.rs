use log::{error, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use widestring::U16CString;

#[macro_use]
extern crate static_assertions;

// Both forms turn a `Result<T, HRESULT>` into the value or an early
// `DxError` return tagged with the call site.
macro_rules! dx_try {
    ($fn_name:ident $args:tt) => {{
        match $fn_name $args {
            Ok(value) => value,
            Err(ret_code) => {
                return Err($crate::DxError::at(
                    stringify!($fn_name),
                    ret_code,
                    file!(),
                    line!(),
                ));
            }
        }
    }};
    ($func_name:literal, $call:expr) => {{
        match $call {
            Ok(value) => value,
            Err(ret_code) => {
                return Err($crate::DxError::at(
                    $func_name,
                    ret_code,
                    file!(),
                    line!(),
                ));
            }
        }
    }};
}

macro_rules! dx_fail {
    ($func_name:literal, $ret_code:expr) => {
        return Err($crate::DxError::at(
            $func_name,
            $ret_code,
            file!(),
            line!(),
        ))
    };
}

macro_rules! impl_object_clone {
    ($struct_type:ident) => {
        impl Clone for $struct_type {
            fn clone(&self) -> Self {
                #[cfg(feature = "log_ref_counting")]
                trace!(
                    "Increased refcount for {}, live reference count: {}",
                    stringify!($struct_type),
                    Arc::strong_count(&self.inner) + 1
                );
                Self {
                    inner: Arc::clone(&self.inner),
                }
            }
        }

        #[cfg(feature = "log_ref_counting")]
        impl Drop for $struct_type {
            fn drop(&mut self) {
                trace!(
                    "Released {}, live reference count: {}",
                    stringify!($struct_type),
                    Arc::strong_count(&self.inner) - 1
                );
            }
        }

        #[cfg(feature = "eq")]
        impl PartialEq for $struct_type {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.inner, &other.inner)
            }
        }

        #[cfg(feature = "eq")]
        impl Eq for $struct_type {}

        #[cfg(feature = "hash")]
        impl std::hash::Hash for $struct_type {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                (Arc::as_ptr(&self.inner) as usize).hash(state);
            }
        }
    };
}

macro_rules! impl_object_set_get_name {
    ($struct_type:ty, $($name_field:ident).+) => {
        impl $struct_type {
            pub fn set_name(&self, name: &str) -> DxResult<()> {
                let name_wstr = match U16CString::from_str(name) {
                    Ok(name_wstr) => name_wstr,
                    Err(_) => dx_fail!("SetName", E_INVALIDARG),
                };
                *software::lock(&self.$($name_field).+) = Some(name_wstr);
                Ok(())
            }

            pub fn get_name(&self) -> DxResult<String> {
                match software::lock(&self.$($name_field).+).as_ref() {
                    Some(name_wstr) => match name_wstr.to_string() {
                        Ok(name) => Ok(name),
                        Err(_) => dx_fail!("GetName", E_FAIL),
                    },
                    None => dx_fail!("GetPrivateData", DXGI_ERROR_NOT_FOUND),
                }
            }
        }
    };
}

#[macro_use]
mod utils;
pub use utils::*;

mod const_wrappers;
pub use const_wrappers::*;

mod struct_wrappers;
pub use struct_wrappers::*;

mod enum_wrappers;
pub use enum_wrappers::*;

mod software;
use software::memory::{next_object_id, HeapMemory, MemoryBudget, SubresourceLayout};
use software::{lock, report, BindPoint, Command, QueueOp, TransitionRecord};

pub mod shader;
use shader::{ComputeShader, PixelShader};

pub mod ao_resources;
pub mod benchmark;
pub mod config;
pub mod cross_adapter;
pub mod error;
pub mod frame_resource;
pub mod hbao;
pub mod math;
pub mod orchestrator;
pub mod queue;
pub mod scene;
pub mod ssao;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DxError {
    func_name: &'static str,
    code: HRESULT,
    file: &'static str,
    line: u32,
}

fn describe_hresult(code: HRESULT) -> &'static str {
    match code {
        S_OK => "The operation completed successfully.",
        E_FAIL => "Unspecified error",
        E_INVALIDARG => "The parameter is incorrect.",
        E_OUTOFMEMORY => "Not enough memory resources are available to complete this operation.",
        DXGI_ERROR_NOT_FOUND => "The object was not found.",
        DXGI_ERROR_DEVICE_REMOVED => "The GPU device instance has been suspended.",
        DXGI_ERROR_WAS_STILL_DRAWING => "The GPU was busy at the moment when a call was made to perform an operation.",
        _ => "Unknown error",
    }
}

impl DxError {
    pub fn new(func_name: &'static str, err_code: HRESULT) -> Self {
        Self {
            func_name,
            code: err_code,
            file: "",
            line: 0,
        }
    }

    pub(crate) fn at(
        func_name: &'static str,
        err_code: HRESULT,
        file: &'static str,
        line: u32,
    ) -> Self {
        Self {
            func_name,
            code: err_code,
            file,
            line,
        }
    }

    pub fn code(&self) -> HRESULT {
        self.code
    }

    pub fn func_name(&self) -> &'static str {
        self.func_name
    }

    fn write_as_str(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{} failed: [{:#010x}] {}",
            self.func_name,
            self.code,
            describe_hresult(self.code)
        )?;
        if self.line != 0 {
            write!(f, " ({}:{})", self.file, self.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for DxError {}

impl std::fmt::Display for DxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_as_str(f)
    }
}

impl std::fmt::Debug for DxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_as_str(f)
    }
}

pub type DxResult<T> = Result<T, DxError>;

#[derive(Clone, Debug)]
enum SharedObject {
    Heap {
        memory: Arc<HeapMemory>,
        desc: HeapDesc,
    },
    Fence(Arc<FenceInner>),
}

/// Process-side handle table of one factory. Handles only resolve on
/// devices created from the factory that issued them.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    next_handle: Mutex<u64>,
    objects: Mutex<HashMap<u64, (String, SharedObject)>>,
}

impl HandleTable {
    fn insert(table: &Arc<Self>, name: &str, object: SharedObject) -> Handle {
        let value = {
            let mut next_handle = lock(&table.next_handle);
            *next_handle += 4;
            *next_handle
        };
        lock(&table.objects).insert(value, (name.to_owned(), object));
        Handle {
            value,
            table: Arc::downgrade(table),
        }
    }

    fn get(&self, value: u64) -> Option<SharedObject> {
        lock(&self.objects).get(&value).map(|(_, object)| object.clone())
    }
}

/// NT handle to a shared heap or fence. Must be closed explicitly; the
/// shared object lives on while any device still references it.
#[derive(Clone, Debug)]
pub struct Handle {
    value: u64,
    table: Weak<HandleTable>,
}

impl Handle {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn close(self) -> DxResult<()> {
        let removed = self
            .table
            .upgrade()
            .and_then(|table| lock(&table.objects).remove(&self.value));
        match removed {
            Some((name, _)) => {
                trace!("Closed shared handle {:#x} '{}'", self.value, name);
                Ok(())
            }
            None => dx_fail!("CloseHandle", E_INVALIDARG),
        }
    }
}

pub(crate) struct FactoryInner {
    adapters: Vec<AdapterDesc>,
    budgets: Vec<Arc<MemoryBudget>>,
    handles: Arc<HandleTable>,
}

pub struct Factory {
    inner: Arc<FactoryInner>,
}
impl_object_clone!(Factory);

impl Factory {
    /// Two hardware-class adapters and a software rasterizer
    pub fn new() -> DxResult<Self> {
        Self::with_adapters(&[
            AdapterDesc::default()
                .set_description("Software Adapter 0")
                .set_dedicated_video_memory(Bytes(1024 * 1024 * 1024)),
            AdapterDesc::default()
                .set_description("Software Adapter 1")
                .set_dedicated_video_memory(Bytes(512 * 1024 * 1024)),
            AdapterDesc::default()
                .set_description("Software Rasterizer")
                .set_dedicated_video_memory(Bytes(256 * 1024 * 1024))
                .set_flags(AdapterFlags::Software),
        ])
    }

    pub fn with_adapters(adapters: &[AdapterDesc]) -> DxResult<Self> {
        if adapters.is_empty() {
            dx_fail!("CreateDXGIFactory2", DXGI_ERROR_NOT_FOUND);
        }
        Ok(Factory {
            inner: Arc::new(FactoryInner {
                adapters: adapters.to_vec(),
                budgets: adapters
                    .iter()
                    .map(|desc| {
                        Arc::new(MemoryBudget::new(desc.dedicated_video_memory.0))
                    })
                    .collect(),
                handles: Arc::new(HandleTable::default()),
            }),
        })
    }

    pub fn enum_adapters(&self) -> Vec<Adapter> {
        (0..self.inner.adapters.len())
            .map(|index| Adapter {
                index,
                factory: Arc::clone(&self.inner),
            })
            .collect()
    }

    pub fn enum_warp_adapter(&self) -> DxResult<Adapter> {
        match self
            .inner
            .adapters
            .iter()
            .position(|desc| desc.flags.contains(AdapterFlags::Software))
        {
            Some(index) => Ok(Adapter {
                index,
                factory: Arc::clone(&self.inner),
            }),
            None => dx_fail!("EnumWarpAdapter", DXGI_ERROR_NOT_FOUND),
        }
    }
}

#[derive(Clone)]
pub struct Adapter {
    index: usize,
    factory: Arc<FactoryInner>,
}

impl Adapter {
    pub fn get_desc(&self) -> &AdapterDesc {
        &self.factory.adapters[self.index]
    }

    pub fn is_software(&self) -> bool {
        self.get_desc().flags.contains(AdapterFlags::Software)
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("index", &self.index)
            .field("desc", self.get_desc())
            .finish()
    }
}

/// What a descriptor heap slot holds
#[derive(Clone, Debug)]
pub(crate) enum Descriptor {
    Cbv {
        address: GpuVirtualAddress,
        size: Bytes,
    },
    Srv {
        resource: Resource,
        format: DxgiFormat,
    },
    Uav {
        resource: Resource,
        format: DxgiFormat,
    },
    Rtv {
        resource: Resource,
        format: DxgiFormat,
    },
    Dsv {
        resource: Resource,
        format: DxgiFormat,
    },
}

// Buffers get virtual addresses well above zero so a null address never
// resolves
const FIRST_GPU_VIRTUAL_ADDRESS: u64 = 0x1_0000_0000;

pub(crate) struct DeviceInner {
    id: u64,
    pub(crate) adapter: AdapterDesc,
    handles: Arc<HandleTable>,
    budget: Arc<MemoryBudget>,
    descriptor_heaps: Mutex<HashMap<u64, Weak<DescriptorHeapInner>>>,
    buffers: Mutex<BTreeMap<u64, Weak<ResourceInner>>>,
    next_gpu_address: Mutex<u64>,
    pub(crate) messages: Mutex<Vec<Message>>,
    name: Mutex<Option<U16CString>>,
}

impl DeviceInner {
    pub(crate) fn resolve_descriptor(&self, ptr: u64) -> Option<Descriptor> {
        let heap = lock(&self.descriptor_heaps)
            .get(&(ptr >> 32))
            .and_then(Weak::upgrade)?;
        let index = (ptr & 0xffff_ffff) / u64::from(DESCRIPTOR_HANDLE_INCREMENT_SIZE);
        let slots = lock(&heap.slots);
        slots.get(index as usize)?.clone()
    }

    pub(crate) fn resolve_gpu_address(
        &self,
        address: GpuVirtualAddress,
    ) -> Option<(Resource, u64)> {
        let buffers = lock(&self.buffers);
        let (base, resource) = buffers.range(..=address.0).next_back()?;
        let inner = resource.upgrade()?;
        let offset = address.0 - base;
        if offset >= inner.layout.size {
            return None;
        }
        Some((Resource { inner }, offset))
    }

    fn write_descriptor(
        &self,
        dest: CpuDescriptorHandle,
        heap_type: DescriptorHeapType,
        descriptor: Descriptor,
    ) -> Result<(), HRESULT> {
        let heap = lock(&self.descriptor_heaps)
            .get(&(dest.ptr >> 32))
            .and_then(Weak::upgrade)
            .ok_or(E_INVALIDARG)?;
        if heap.desc.heap_type() != heap_type {
            return Err(E_INVALIDARG);
        }
        let index = (dest.ptr & 0xffff_ffff) / u64::from(DESCRIPTOR_HANDLE_INCREMENT_SIZE);
        let mut slots = lock(&heap.slots);
        let slot = slots.get_mut(index as usize).ok_or(E_INVALIDARG)?;
        *slot = Some(descriptor);
        Ok(())
    }
}

pub struct Device {
    inner: Arc<DeviceInner>,
}
impl_object_clone!(Device);
impl_object_set_get_name!(Device, inner.name);

pub enum DeviceChild {
    Heap(Heap),
    Fence(Fence),
}

impl From<Heap> for DeviceChild {
    fn from(heap: Heap) -> Self {
        DeviceChild::Heap(heap)
    }
}

impl From<Fence> for DeviceChild {
    fn from(fence: Fence) -> Self {
        DeviceChild::Fence(fence)
    }
}

fn validate_resource_desc(
    desc: &ResourceDesc,
    heap_flags: HeapFlags,
) -> Result<SubresourceLayout, HRESULT> {
    let layout = SubresourceLayout::for_desc(desc)?;
    let flags = desc.flags();
    if flags.contains(ResourceFlags::AllowCrossAdapter) {
        // Cross-adapter memory has to be interpretable by both adapters,
        // which only a row-major layout guarantees
        if desc.layout() != TextureLayout::RowMajor
            || !heap_flags.contains(HeapFlags::SharedCrossAdapter)
        {
            return Err(E_INVALIDARG);
        }
    } else if desc.dimension() == ResourceDimension::Texture2D
        && desc.layout() == TextureLayout::RowMajor
    {
        return Err(E_INVALIDARG);
    }
    if flags.contains(ResourceFlags::AllowDepthStencil)
        && (desc.layout() == TextureLayout::RowMajor
            || desc.format().family() != DxgiFormat::R32_Typeless
            || heap_flags.contains(HeapFlags::SharedCrossAdapter))
    {
        return Err(E_INVALIDARG);
    }
    if flags.intersects(
        ResourceFlags::AllowRenderTarget | ResourceFlags::AllowDepthStencil,
    ) && desc.dimension() != ResourceDimension::Texture2D
    {
        return Err(E_INVALIDARG);
    }
    Ok(layout)
}

fn validate_initial_state(
    heap_type: HeapType,
    initial_state: ResourceStates,
) -> Result<(), HRESULT> {
    match heap_type {
        HeapType::Upload if initial_state != ResourceStates::GenericRead => {
            Err(E_INVALIDARG)
        }
        HeapType::Readback if initial_state != ResourceStates::CopyDest => {
            Err(E_INVALIDARG)
        }
        _ => Ok(()),
    }
}

fn view_format(
    resource: &Resource,
    requested: Option<DxgiFormat>,
) -> Result<DxgiFormat, HRESULT> {
    let resource_format = resource.inner.desc.format();
    if resource.inner.desc.dimension() != ResourceDimension::Texture2D {
        return Err(E_INVALIDARG);
    }
    match requested {
        Some(format) if format != DxgiFormat::Unknown => {
            if format.is_typeless() || !resource_format.is_view_compatible(format)
            {
                Err(E_INVALIDARG)
            } else {
                Ok(format)
            }
        }
        _ => {
            if resource_format.is_typeless() {
                Err(E_INVALIDARG)
            } else {
                Ok(resource_format)
            }
        }
    }
}

impl Device {
    pub fn new(adapter: &Adapter) -> DxResult<Self> {
        let adapter_desc = adapter.get_desc().clone();
        trace!("Creating device on '{}'", adapter_desc.description);
        Ok(Device {
            inner: Arc::new(DeviceInner {
                id: next_object_id(),
                adapter: adapter_desc,
                handles: Arc::clone(&adapter.factory.handles),
                budget: Arc::clone(&adapter.factory.budgets[adapter.index]),
                descriptor_heaps: Mutex::new(HashMap::new()),
                buffers: Mutex::new(BTreeMap::new()),
                next_gpu_address: Mutex::new(FIRST_GPU_VIRTUAL_ADDRESS),
                messages: Mutex::new(vec![]),
                name: Mutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn adapter_desc(&self) -> &AdapterDesc {
        &self.inner.adapter
    }

    /// Bytes of the adapter's dedicated memory currently allocated
    pub fn memory_usage(&self) -> Bytes {
        Bytes(self.inner.budget.used())
    }

    pub fn create_command_queue(
        &self,
        desc: &CommandQueueDesc,
    ) -> DxResult<CommandQueue> {
        let (sender, receiver) = mpsc::channel();
        let shutting_down = Arc::new(AtomicBool::new(false));
        let queue_name = format!(
            "{} {:?} queue",
            self.inner.adapter.description,
            desc.queue_type()
        );

        let worker = {
            let device = Arc::clone(&self.inner);
            let shutting_down = Arc::clone(&shutting_down);
            let queue_name = queue_name.clone();
            thread::Builder::new().name(queue_name.clone()).spawn(move || {
                software::run_queue(device, queue_name, receiver, shutting_down)
            })
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                error!("Cannot spawn worker for {}: {}", queue_name, err);
                dx_fail!("CreateCommandQueue", E_FAIL);
            }
        };

        Ok(CommandQueue {
            inner: Arc::new(CommandQueueInner {
                device: Arc::clone(&self.inner),
                queue_type: desc.queue_type(),
                sender: Mutex::new(sender),
                worker: Mutex::new(Some(worker)),
                shutting_down,
                name: Mutex::new(None),
            }),
        })
    }

    pub fn create_command_list(
        &self,
        command_list_type: CommandListType,
    ) -> DxResult<CommandList> {
        Ok(CommandList {
            device: Arc::clone(&self.inner),
            command_list_type,
            commands: vec![],
            recorded: Arc::new(vec![]),
            pending_barriers: vec![],
            closed: false,
            name: Mutex::new(None),
        })
    }

    pub fn create_fence(
        &self,
        initial_value: u64,
        flags: FenceFlags,
    ) -> DxResult<Fence> {
        Ok(Fence {
            inner: Arc::new(FenceInner {
                value: Mutex::new(initial_value),
                completed: Condvar::new(),
                waiters: Mutex::new(vec![]),
                flags,
                name: Mutex::new(None),
            }),
        })
    }

    pub fn create_heap(&self, heap_desc: &HeapDesc) -> DxResult<Heap> {
        let flags = heap_desc.flags();
        if flags.contains(HeapFlags::SharedCrossAdapter)
            && (!flags.contains(HeapFlags::Shared)
                || heap_desc.properties().heap_type() != HeapType::Default)
        {
            dx_fail!("CreateHeap", E_INVALIDARG);
        }
        let memory = dx_try!(
            "CreateHeap",
            HeapMemory::allocate(heap_desc.size_in_bytes().0, &self.inner.budget)
        );
        Ok(Heap {
            inner: Arc::new(HeapInner {
                memory,
                desc: *heap_desc,
                device_id: self.inner.id,
                name: Mutex::new(None),
            }),
        })
    }

    fn make_resource(
        &self,
        desc: &ResourceDesc,
        heap_type: HeapType,
        memory: Arc<HeapMemory>,
        offset: u64,
        layout: SubresourceLayout,
        initial_state: ResourceStates,
        heap: Option<Heap>,
    ) -> Resource {
        let gpu_address = if desc.dimension() == ResourceDimension::Buffer {
            let mut next_address = lock(&self.inner.next_gpu_address);
            let address = *next_address;
            *next_address += layout.allocation_size();
            Some(address)
        } else {
            None
        };

        let inner = Arc::new(ResourceInner {
            id: next_object_id(),
            desc: *desc,
            heap_type,
            memory,
            offset,
            layout,
            gpu_address,
            gpu_state: Mutex::new(initial_state),
            recorded_state: Mutex::new(initial_state),
            _heap: heap,
            name: Mutex::new(None),
        });

        if let Some(address) = gpu_address {
            let mut buffers = lock(&self.inner.buffers);
            buffers.retain(|_, resource| resource.strong_count() > 0);
            buffers.insert(address, Arc::downgrade(&inner));
        }

        Resource { inner }
    }

    pub fn create_committed_resource(
        &self,
        heap_props: &HeapProperties,
        heap_flags: HeapFlags,
        resource_desc: &ResourceDesc,
        initial_state: ResourceStates,
        _optimized_clear_value: Option<&ClearValue>,
    ) -> DxResult<Resource> {
        let layout = dx_try!(
            "CreateCommittedResource",
            validate_resource_desc(resource_desc, heap_flags)
        );
        dx_try!(
            "CreateCommittedResource",
            validate_initial_state(heap_props.heap_type(), initial_state)
        );
        let memory = dx_try!(
            "CreateCommittedResource",
            HeapMemory::allocate(layout.allocation_size(), &self.inner.budget)
        );
        Ok(self.make_resource(
            resource_desc,
            heap_props.heap_type(),
            memory,
            0,
            layout,
            initial_state,
            None,
        ))
    }

    pub fn create_placed_resource(
        &self,
        heap: &Heap,
        heap_offset: Bytes,
        resource_desc: &ResourceDesc,
        initial_state: ResourceStates,
        _optimized_clear_value: Option<&ClearValue>,
    ) -> DxResult<Resource> {
        if heap.inner.device_id != self.inner.id {
            warn!("Placing a resource in a heap owned by another device");
            dx_fail!("CreatePlacedResource", E_INVALIDARG);
        }
        let layout = dx_try!(
            "CreatePlacedResource",
            validate_resource_desc(resource_desc, heap.inner.desc.flags())
        );
        let heap_type = heap.inner.desc.properties().heap_type();
        dx_try!(
            "CreatePlacedResource",
            validate_initial_state(heap_type, initial_state)
        );
        if heap_offset.0 % DEFAULT_RESOURCE_ALIGNMENT.0 != 0
            || heap_offset.0 + layout.allocation_size() > heap.inner.memory.size
        {
            dx_fail!("CreatePlacedResource", E_INVALIDARG);
        }
        Ok(self.make_resource(
            resource_desc,
            heap_type,
            Arc::clone(&heap.inner.memory),
            heap_offset.0,
            layout,
            initial_state,
            Some(heap.clone()),
        ))
    }

    /// Layout a texture takes when copied into a buffer: rows padded to the
    /// texture data pitch alignment. Returns the placed footprints, row
    /// counts, unpadded row sizes and total byte size.
    pub fn get_copyable_footprints(
        &self,
        resource_desc: &ResourceDesc,
        first_subresource: u32,
        num_subresources: u32,
        base_offset: Bytes,
    ) -> DxResult<(Vec<PlacedSubresourceFootprint>, Vec<u32>, Vec<Bytes>, Bytes)>
    {
        if first_subresource != 0 || num_subresources != 1 {
            dx_fail!("GetCopyableFootprints", E_INVALIDARG);
        }
        let layout = dx_try!(
            "GetCopyableFootprints",
            SubresourceLayout::for_desc(resource_desc)
        );
        let row_pitch =
            align_to_multiple(layout.row_bytes(), TEXTURE_DATA_PITCH_ALIGNMENT.0);
        let footprint = PlacedSubresourceFootprint::default()
            .set_offset(align_to_multiple(
                base_offset.0,
                TEXTURE_DATA_PLACEMENT_ALIGNMENT.0,
            ))
            .set_footprint(
                SubresourceFootprint::default()
                    .set_format(resource_desc.format())
                    .set_width(layout.width)
                    .set_height(layout.height)
                    .set_depth(1)
                    .set_row_pitch(row_pitch as u32),
            );
        let total_bytes = u64::from(layout.height - 1) * row_pitch + layout.row_bytes();
        Ok((
            vec![footprint],
            vec![layout.height],
            vec![Bytes(layout.row_bytes())],
            Bytes(total_bytes),
        ))
    }

    pub fn create_shared_handle(
        &self,
        object: &DeviceChild,
        name: &str,
    ) -> DxResult<Handle> {
        let shared = match object {
            DeviceChild::Heap(heap) => {
                if !heap.inner.desc.flags().contains(HeapFlags::Shared) {
                    dx_fail!("CreateSharedHandle", E_INVALIDARG);
                }
                SharedObject::Heap {
                    memory: Arc::clone(&heap.inner.memory),
                    desc: heap.inner.desc,
                }
            }
            DeviceChild::Fence(fence) => {
                if !fence
                    .inner
                    .flags
                    .intersects(FenceFlags::Shared | FenceFlags::SharedCrossAdapter)
                {
                    dx_fail!("CreateSharedHandle", E_INVALIDARG);
                }
                SharedObject::Fence(Arc::clone(&fence.inner))
            }
        };
        let handle = HandleTable::insert(&self.inner.handles, name, shared);
        trace!("Created shared handle {:#x} '{}'", handle.value, name);
        Ok(handle)
    }

    fn open_shared_object(&self, handle: &Handle) -> Option<SharedObject> {
        let table = handle.table.upgrade()?;
        if !Arc::ptr_eq(&table, &self.inner.handles) {
            warn!(
                "Shared handle {:#x} was issued by a different factory",
                handle.value
            );
            return None;
        }
        table.get(handle.value)
    }

    pub fn open_shared_heap_handle(&self, handle: &Handle) -> DxResult<Heap> {
        match self.open_shared_object(handle) {
            Some(SharedObject::Heap { memory, desc }) => Ok(Heap {
                inner: Arc::new(HeapInner {
                    memory,
                    desc,
                    device_id: self.inner.id,
                    name: Mutex::new(None),
                }),
            }),
            _ => dx_fail!("OpenSharedHandle", E_INVALIDARG),
        }
    }

    pub fn open_shared_fence_handle(&self, handle: &Handle) -> DxResult<Fence> {
        match self.open_shared_object(handle) {
            Some(SharedObject::Fence(inner)) => Ok(Fence { inner }),
            _ => dx_fail!("OpenSharedHandle", E_INVALIDARG),
        }
    }

    pub fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> DxResult<DescriptorHeap> {
        if desc.num_descriptors() == 0
            || (desc.flags().contains(DescriptorHeapFlags::ShaderVisible)
                && desc.heap_type() != DescriptorHeapType::CBV_SRV_UAV)
        {
            dx_fail!("CreateDescriptorHeap", E_INVALIDARG);
        }
        let inner = Arc::new(DescriptorHeapInner {
            id: next_object_id(),
            desc: *desc,
            slots: Mutex::new(vec![None; desc.num_descriptors() as usize]),
            name: Mutex::new(None),
        });
        let mut heaps = lock(&self.inner.descriptor_heaps);
        heaps.retain(|_, heap| heap.strong_count() > 0);
        heaps.insert(inner.id, Arc::downgrade(&inner));
        Ok(DescriptorHeap { inner })
    }

    pub fn create_shader_resource_view(
        &self,
        resource: &Resource,
        desc: Option<&ShaderResourceViewDesc>,
        dest_descriptor: CpuDescriptorHandle,
    ) -> DxResult<()> {
        if resource
            .inner
            .desc
            .flags()
            .contains(ResourceFlags::DenyShaderResource)
        {
            dx_fail!("CreateShaderResourceView", E_INVALIDARG);
        }
        let format = dx_try!(
            "CreateShaderResourceView",
            view_format(resource, desc.map(|desc| desc.format()))
        );
        if format.is_depth() {
            dx_fail!("CreateShaderResourceView", E_INVALIDARG);
        }
        dx_try!(
            "CreateShaderResourceView",
            self.inner.write_descriptor(
                dest_descriptor,
                DescriptorHeapType::CBV_SRV_UAV,
                Descriptor::Srv {
                    resource: resource.clone(),
                    format,
                },
            )
        );
        Ok(())
    }

    pub fn create_unordered_access_view(
        &self,
        resource: &Resource,
        desc: Option<&UnorderedAccessViewDesc>,
        dest_descriptor: CpuDescriptorHandle,
    ) -> DxResult<()> {
        if !resource
            .inner
            .desc
            .flags()
            .contains(ResourceFlags::AllowUnorderedAccess)
        {
            dx_fail!("CreateUnorderedAccessView", E_INVALIDARG);
        }
        let format = dx_try!(
            "CreateUnorderedAccessView",
            view_format(resource, desc.map(|desc| desc.format()))
        );
        dx_try!(
            "CreateUnorderedAccessView",
            self.inner.write_descriptor(
                dest_descriptor,
                DescriptorHeapType::CBV_SRV_UAV,
                Descriptor::Uav {
                    resource: resource.clone(),
                    format,
                },
            )
        );
        Ok(())
    }

    pub fn create_render_target_view(
        &self,
        resource: &Resource,
        desc: Option<&RenderTargetViewDesc>,
        dest_descriptor: CpuDescriptorHandle,
    ) -> DxResult<()> {
        if !resource
            .inner
            .desc
            .flags()
            .contains(ResourceFlags::AllowRenderTarget)
        {
            dx_fail!("CreateRenderTargetView", E_INVALIDARG);
        }
        let format = dx_try!(
            "CreateRenderTargetView",
            view_format(resource, desc.map(|desc| desc.format()))
        );
        dx_try!(
            "CreateRenderTargetView",
            self.inner.write_descriptor(
                dest_descriptor,
                DescriptorHeapType::RTV,
                Descriptor::Rtv {
                    resource: resource.clone(),
                    format,
                },
            )
        );
        Ok(())
    }

    pub fn create_depth_stencil_view(
        &self,
        resource: &Resource,
        desc: Option<&DepthStencilViewDesc>,
        dest_descriptor: CpuDescriptorHandle,
    ) -> DxResult<()> {
        if !resource
            .inner
            .desc
            .flags()
            .contains(ResourceFlags::AllowDepthStencil)
        {
            dx_fail!("CreateDepthStencilView", E_INVALIDARG);
        }
        let format = dx_try!(
            "CreateDepthStencilView",
            view_format(resource, desc.map(|desc| desc.format()))
        );
        if !format.is_depth() {
            dx_fail!("CreateDepthStencilView", E_INVALIDARG);
        }
        dx_try!(
            "CreateDepthStencilView",
            self.inner.write_descriptor(
                dest_descriptor,
                DescriptorHeapType::DSV,
                Descriptor::Dsv {
                    resource: resource.clone(),
                    format,
                },
            )
        );
        Ok(())
    }

    pub fn create_constant_buffer_view(
        &self,
        desc: &ConstantBufferViewDesc,
        dest_descriptor: CpuDescriptorHandle,
    ) -> DxResult<()> {
        if desc.size_in_bytes().0 % CONSTANT_BUFFER_ALIGNMENT.0 != 0
            || desc.size_in_bytes() > MAX_CONSTANT_BUFFER_VIEW_SIZE
            || self.inner.resolve_gpu_address(desc.buffer_location()).is_none()
        {
            dx_fail!("CreateConstantBufferView", E_INVALIDARG);
        }
        dx_try!(
            "CreateConstantBufferView",
            self.inner.write_descriptor(
                dest_descriptor,
                DescriptorHeapType::CBV_SRV_UAV,
                Descriptor::Cbv {
                    address: desc.buffer_location(),
                    size: desc.size_in_bytes(),
                },
            )
        );
        Ok(())
    }

    pub fn create_root_signature(
        &self,
        _node_mask: u32,
        desc: &RootSignatureDesc,
    ) -> DxResult<RootSignature> {
        let empty_table = desc.parameters().iter().any(|parameter| {
            parameter.parameter_type() == RootParameterType::DescriptorTable
                && parameter.descriptor_table().descriptor_ranges().is_empty()
        });
        let mut sampler_registers: Vec<u32> = desc
            .static_samplers()
            .iter()
            .map(|sampler| sampler.shader_register())
            .collect();
        sampler_registers.sort_unstable();
        sampler_registers.dedup();
        if empty_table || sampler_registers.len() != desc.static_samplers().len() {
            dx_fail!("D3D12SerializeVersionedRootSignature", E_INVALIDARG);
        }
        Ok(RootSignature {
            inner: Arc::new(RootSignatureInner {
                desc: desc.clone(),
                name: Mutex::new(None),
            }),
        })
    }

    pub fn create_graphics_pipeline_state(
        &self,
        pso_desc: &GraphicsPipelineStateDesc,
    ) -> DxResult<PipelineState> {
        let (root_signature, pixel_shader) =
            match (&pso_desc.root_signature, &pso_desc.pixel_shader) {
                (Some(root_signature), Some(pixel_shader)) => {
                    (root_signature.clone(), Arc::clone(pixel_shader))
                }
                _ => dx_fail!("CreateGraphicsPipelineState", E_INVALIDARG),
            };
        let uses_input_assembler = root_signature
            .inner
            .desc
            .flags()
            .contains(RootSignatureFlags::AllowInputAssemblerInputLayout);
        if pso_desc.rtv_formats.len() > SIMULTANEOUS_RENDER_TARGET_COUNT
            || (!pso_desc.input_layout.elements().is_empty() && !uses_input_assembler)
            || (pso_desc.dsv_format != DxgiFormat::Unknown
                && !pso_desc.dsv_format.is_depth())
        {
            dx_fail!("CreateGraphicsPipelineState", E_INVALIDARG);
        }
        Ok(PipelineState {
            inner: Arc::new(PipelineStateInner {
                kind: PipelineKind::Graphics {
                    pixel_shader,
                    depth_stencil_state: pso_desc.depth_stencil_state,
                    rtv_formats: pso_desc.rtv_formats.clone(),
                    dsv_format: pso_desc.dsv_format,
                },
                root_signature,
                name: Mutex::new(None),
            }),
        })
    }

    pub fn create_compute_pipeline_state(
        &self,
        pso_desc: &ComputePipelineStateDesc,
    ) -> DxResult<PipelineState> {
        match (&pso_desc.root_signature, &pso_desc.compute_shader) {
            (Some(root_signature), Some(compute_shader)) => Ok(PipelineState {
                inner: Arc::new(PipelineStateInner {
                    kind: PipelineKind::Compute {
                        compute_shader: Arc::clone(compute_shader),
                    },
                    root_signature: root_signature.clone(),
                    name: Mutex::new(None),
                }),
            }),
            _ => dx_fail!("CreateComputePipelineState", E_INVALIDARG),
        }
    }
}

pub(crate) struct HeapInner {
    memory: Arc<HeapMemory>,
    desc: HeapDesc,
    device_id: u64,
    name: Mutex<Option<U16CString>>,
}

pub struct Heap {
    inner: Arc<HeapInner>,
}
impl_object_clone!(Heap);
impl_object_set_get_name!(Heap, inner.name);

impl Heap {
    pub fn get_desc(&self) -> HeapDesc {
        self.inner.desc
    }

    /// Identifies the physical allocation; a heap opened from a shared
    /// handle reports the same id as the heap it was exported from
    pub fn allocation_id(&self) -> u64 {
        self.inner.memory.id
    }
}

pub(crate) struct ResourceInner {
    id: u64,
    pub(crate) desc: ResourceDesc,
    heap_type: HeapType,
    pub(crate) memory: Arc<HeapMemory>,
    pub(crate) offset: u64,
    pub(crate) layout: SubresourceLayout,
    gpu_address: Option<u64>,
    /// State on the queue timeline, checked when commands execute
    pub(crate) gpu_state: Mutex<ResourceStates>,
    /// State after the last barrier recorded into any command list
    recorded_state: Mutex<ResourceStates>,
    _heap: Option<Heap>,
    name: Mutex<Option<U16CString>>,
}

pub struct Resource {
    pub(crate) inner: Arc<ResourceInner>,
}
impl_object_clone!(Resource);
impl_object_set_get_name!(Resource, inner.name);

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get_name() {
            Ok(name) => write!(f, "Resource '{}'", name),
            Err(_) => write!(f, "Resource #{}", self.inner.id),
        }
    }
}

impl Resource {
    pub fn get_desc(&self) -> ResourceDesc {
        self.inner.desc
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn heap_type(&self) -> HeapType {
        self.inner.heap_type
    }

    /// Textures have no virtual address and report zero
    pub fn get_gpu_virtual_address(&self) -> GpuVirtualAddress {
        GpuVirtualAddress(self.inner.gpu_address.unwrap_or(0))
    }

    pub fn allocation_id(&self) -> u64 {
        self.inner.memory.id
    }

    pub fn offset_in_heap(&self) -> Bytes {
        Bytes(self.inner.offset)
    }

    /// State the resource will be in once everything recorded so far has
    /// executed
    pub fn state(&self) -> ResourceStates {
        *lock(&self.inner.recorded_state)
    }

    fn check_cpu_access(&self, offset: Bytes, size: Bytes) -> Result<(), HRESULT> {
        if !self.inner.heap_type.is_cpu_visible()
            || offset.0 + size.0 > self.inner.layout.size
        {
            return Err(E_INVALIDARG);
        }
        Ok(())
    }

    /// CPU write through a mapped upload or readback resource
    pub fn write_data(&self, offset: Bytes, data: &[u8]) -> DxResult<()> {
        dx_try!(
            "Map",
            self.check_cpu_access(offset, Bytes::from(data.len()))
        );
        self.inner.memory.write(self.inner.offset + offset.0, data);
        Ok(())
    }

    /// CPU read through a mapped upload or readback resource
    pub fn read_data(&self, offset: Bytes, size: Bytes) -> DxResult<Vec<u8>> {
        dx_try!("Map", self.check_cpu_access(offset, size));
        Ok(self.inner.memory.read(self.inner.offset + offset.0, size.0))
    }
}

pub(crate) struct DescriptorHeapInner {
    id: u64,
    desc: DescriptorHeapDesc,
    slots: Mutex<Vec<Option<Descriptor>>>,
    name: Mutex<Option<U16CString>>,
}

pub struct DescriptorHeap {
    pub(crate) inner: Arc<DescriptorHeapInner>,
}
impl_object_clone!(DescriptorHeap);
impl_object_set_get_name!(DescriptorHeap, inner.name);

impl std::fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DescriptorHeap #{} {:?}", self.inner.id, self.inner.desc)
    }
}

impl DescriptorHeap {
    pub fn get_desc(&self) -> DescriptorHeapDesc {
        self.inner.desc
    }

    pub fn get_cpu_descriptor_handle_for_heap_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle {
            ptr: self.inner.id << 32,
            handle_size: DESCRIPTOR_HANDLE_INCREMENT_SIZE,
        }
    }

    /// Null handle unless the heap is shader visible
    pub fn get_gpu_descriptor_handle_for_heap_start(&self) -> GpuDescriptorHandle {
        let shader_visible = self
            .inner
            .desc
            .flags()
            .contains(DescriptorHeapFlags::ShaderVisible);
        GpuDescriptorHandle {
            ptr: if shader_visible { self.inner.id << 32 } else { 0 },
            handle_size: DESCRIPTOR_HANDLE_INCREMENT_SIZE,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CpuDescriptorHandle {
    pub ptr: u64,
    pub handle_size: u32,
}

impl CpuDescriptorHandle {
    #[must_use]
    pub fn advance(self, distance: u32) -> Self {
        CpuDescriptorHandle {
            ptr: self.ptr + u64::from(distance * self.handle_size),
            handle_size: self.handle_size,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GpuDescriptorHandle {
    pub ptr: u64,
    pub handle_size: u32,
}

impl GpuDescriptorHandle {
    #[must_use]
    pub fn advance(self, distance: u32) -> Self {
        GpuDescriptorHandle {
            ptr: self.ptr + u64::from(distance * self.handle_size),
            handle_size: self.handle_size,
        }
    }
}

pub(crate) struct RootSignatureInner {
    pub(crate) desc: RootSignatureDesc,
    name: Mutex<Option<U16CString>>,
}

pub struct RootSignature {
    pub(crate) inner: Arc<RootSignatureInner>,
}
impl_object_clone!(RootSignature);
impl_object_set_get_name!(RootSignature, inner.name);

impl std::fmt::Debug for RootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSignature")
            .field("desc", &self.inner.desc)
            .finish()
    }
}

pub(crate) enum PipelineKind {
    Graphics {
        pixel_shader: Arc<dyn PixelShader>,
        depth_stencil_state: DepthStencilDesc,
        rtv_formats: Vec<DxgiFormat>,
        dsv_format: DxgiFormat,
    },
    Compute {
        compute_shader: Arc<dyn ComputeShader>,
    },
}

pub(crate) struct PipelineStateInner {
    pub(crate) kind: PipelineKind,
    pub(crate) root_signature: RootSignature,
    name: Mutex<Option<U16CString>>,
}

pub struct PipelineState {
    pub(crate) inner: Arc<PipelineStateInner>,
}
impl_object_clone!(PipelineState);
impl_object_set_get_name!(PipelineState, inner.name);

impl PipelineState {
    pub(crate) fn shader_name(&self) -> &str {
        match &self.inner.kind {
            PipelineKind::Graphics { pixel_shader, .. } => pixel_shader.name(),
            PipelineKind::Compute { compute_shader } => compute_shader.name(),
        }
    }
}

/// Auto-reset event, the counterpart of a Win32 event object
#[derive(Clone, Debug, Default)]
pub struct Event {
    inner: Arc<EventInner>,
}

#[derive(Debug, Default)]
struct EventInner {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    pub fn set(&self) {
        *lock(&self.inner.signaled) = true;
        self.inner.condvar.notify_all();
    }

    /// Returns false on timeout. `None` waits forever.
    pub fn wait(&self, milliseconds: Option<u32>) -> bool {
        let mut signaled = lock(&self.inner.signaled);
        while !*signaled {
            signaled = match milliseconds {
                None => self
                    .inner
                    .condvar
                    .wait(signaled)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(timeout) => {
                    let (guard, result) = self
                        .inner
                        .condvar
                        .wait_timeout(signaled, Duration::from_millis(u64::from(timeout)))
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    if result.timed_out() && !*guard {
                        return false;
                    }
                    guard
                }
            };
        }
        *signaled = false;
        true
    }
}

#[derive(Debug)]
pub(crate) struct FenceInner {
    value: Mutex<u64>,
    completed: Condvar,
    waiters: Mutex<Vec<(u64, Event)>>,
    flags: FenceFlags,
    name: Mutex<Option<U16CString>>,
}

pub struct Fence {
    inner: Arc<FenceInner>,
}
impl_object_clone!(Fence);
impl_object_set_get_name!(Fence, inner.name);

impl Fence {
    pub fn get_completed_value(&self) -> u64 {
        *lock(&self.inner.value)
    }

    /// CPU-side signal
    pub fn signal(&self, value: u64) -> DxResult<()> {
        self.complete(value);
        Ok(())
    }

    pub fn set_event_on_completion(&self, value: u64, event: &Event) -> DxResult<()> {
        let mut waiters = lock(&self.inner.waiters);
        if self.get_completed_value() >= value {
            event.set();
        } else {
            waiters.push((value, event.clone()));
        }
        Ok(())
    }

    pub(crate) fn complete(&self, value: u64) {
        *lock(&self.inner.value) = value;
        self.inner.completed.notify_all();

        let ready: Vec<(u64, Event)> = {
            let mut waiters = lock(&self.inner.waiters);
            let (ready, pending): (Vec<_>, Vec<_>) = waiters
                .drain(..)
                .partition(|(target, _)| *target <= value);
            *waiters = pending;
            ready
        };
        for (_, event) in ready {
            event.set();
        }
    }

    /// Blocks a queue worker until the fence reaches `value`. Returns false
    /// when the queue is torn down first.
    pub(crate) fn block_until(&self, value: u64, abort: &AtomicBool) -> bool {
        let mut current = lock(&self.inner.value);
        while *current < value {
            if abort.load(Ordering::Acquire) {
                return false;
            }
            current = match self
                .inner
                .completed
                .wait_timeout(current, Duration::from_millis(10))
            {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

pub(crate) struct CommandQueueInner {
    device: Arc<DeviceInner>,
    queue_type: CommandListType,
    sender: Mutex<Sender<QueueOp>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutting_down: Arc<AtomicBool>,
    name: Mutex<Option<U16CString>>,
}

impl Drop for CommandQueueInner {
    fn drop(&mut self) {
        // Work already submitted drains first; a pending wait on a fence
        // nobody will signal any more is abandoned
        let _ = lock(&self.sender).send(QueueOp::Shutdown);
        self.shutting_down.store(true, Ordering::Release);
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                error!("Command queue worker panicked");
            }
        }
    }
}

pub struct CommandQueue {
    inner: Arc<CommandQueueInner>,
}
impl_object_clone!(CommandQueue);
impl_object_set_get_name!(CommandQueue, inner.name);

impl CommandQueue {
    pub fn queue_type(&self) -> CommandListType {
        self.inner.queue_type
    }

    fn submit(&self, operation: QueueOp) -> Result<(), HRESULT> {
        lock(&self.inner.sender)
            .send(operation)
            .map_err(|_| DXGI_ERROR_DEVICE_REMOVED)
    }

    pub fn execute_command_lists(&self, command_lists: &[CommandList]) -> DxResult<()> {
        let mut batches = Vec::with_capacity(command_lists.len());
        for command_list in command_lists {
            let valid = command_list.closed
                && Arc::ptr_eq(&command_list.device, &self.inner.device)
                && command_list.command_list_type == self.inner.queue_type;
            if !valid {
                report(
                    &self.inner.device,
                    MessageSeverity::Error,
                    MessageCategory::Execution,
                    String::from(
                        "ExecuteCommandLists: command list is open or belongs to another device or queue type",
                    ),
                );
                dx_fail!("ExecuteCommandLists", E_INVALIDARG);
            }
            batches.push(Arc::clone(&command_list.recorded));
        }
        dx_try!("ExecuteCommandLists", self.submit(QueueOp::Execute(batches)));
        Ok(())
    }

    pub fn signal(&self, fence: &Fence, value: u64) -> DxResult<()> {
        dx_try!("Signal", self.submit(QueueOp::Signal(fence.clone(), value)));
        Ok(())
    }

    /// GPU-side wait; later submissions to this queue stall until the
    /// fence reaches `value`
    pub fn wait(&self, fence: &Fence, value: u64) -> DxResult<()> {
        dx_try!("Wait", self.submit(QueueOp::Wait(fence.clone(), value)));
        Ok(())
    }
}

/// Records commands for later execution on a queue. Commands are
/// validated against resource states and bindings when they execute; the
/// validation output goes to the device's `InfoQueue`.
pub struct CommandList {
    device: Arc<DeviceInner>,
    command_list_type: CommandListType,
    commands: Vec<Command>,
    recorded: Arc<Vec<Command>>,
    pending_barriers: Vec<TransitionRecord>,
    closed: bool,
    name: Mutex<Option<U16CString>>,
}
impl_object_set_get_name!(CommandList, name);

impl CommandList {
    pub fn command_list_type(&self) -> CommandListType {
        self.command_list_type
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn record(&mut self, command: Command) {
        if self.closed {
            report(
                &self.device,
                MessageSeverity::Error,
                MessageCategory::StateSetting,
                String::from("Command recorded into a closed command list"),
            );
            return;
        }
        self.commands.push(command);
    }

    /// Work that reads or writes resources must come after the barriers it
    /// depends on have been flushed
    fn record_work(&mut self, operation: &str, command: Command) {
        if !self.pending_barriers.is_empty() {
            report(
                &self.device,
                MessageSeverity::Error,
                MessageCategory::ResourceManipulation,
                format!(
                    "{} recorded with {} unflushed resource barrier(s)",
                    operation,
                    self.pending_barriers.len()
                ),
            );
        }
        self.record(command);
    }

    pub fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        let mut transitions = vec![];
        for barrier in barriers {
            match barrier {
                ResourceBarrier::Transition(transition) => match transition.resource() {
                    Some(resource) => {
                        *lock(&resource.inner.recorded_state) = transition.state_after();
                        transitions.push(TransitionRecord {
                            resource: resource.clone(),
                            before: transition.state_before(),
                            after: transition.state_after(),
                        });
                    }
                    None => report(
                        &self.device,
                        MessageSeverity::Error,
                        MessageCategory::ResourceManipulation,
                        String::from("Transition barrier without a resource"),
                    ),
                },
            }
        }
        if !transitions.is_empty() {
            self.record(Command::Barriers(transitions));
        }
    }

    /// Queues a transition from whatever state the resource was last
    /// recorded in. Nothing is recorded until `flush_resource_barriers`.
    pub fn transition_barrier(&mut self, resource: &Resource, state_after: ResourceStates) {
        let mut recorded_state = lock(&resource.inner.recorded_state);
        if *recorded_state == state_after {
            return;
        }
        self.pending_barriers.push(TransitionRecord {
            resource: resource.clone(),
            before: *recorded_state,
            after: state_after,
        });
        *recorded_state = state_after;
    }

    pub fn flush_resource_barriers(&mut self) {
        if self.pending_barriers.is_empty() {
            return;
        }
        let transitions = std::mem::take(&mut self.pending_barriers);
        self.record(Command::Barriers(transitions));
    }

    pub fn clear_render_target_view(&mut self, rtv_handle: CpuDescriptorHandle, color: [f32; 4]) {
        self.record_work(
            "ClearRenderTargetView",
            Command::ClearRenderTarget {
                rtv: rtv_handle,
                color,
            },
        );
    }

    pub fn clear_depth_stencil_view(
        &mut self,
        dsv_handle: CpuDescriptorHandle,
        flags: ClearFlags,
        depth: f32,
        _stencil: u8,
    ) {
        if flags.contains(ClearFlags::Depth) {
            self.record_work(
                "ClearDepthStencilView",
                Command::ClearDepthStencil {
                    dsv: dsv_handle,
                    depth,
                },
            );
        }
    }

    pub fn copy_resource(&mut self, dest: &Resource, source: &Resource) {
        self.record_work(
            "CopyResource",
            Command::CopyResource {
                dest: dest.clone(),
                source: source.clone(),
            },
        );
    }

    pub fn copy_texture_region(&mut self, dest: TextureCopyLocation, source: TextureCopyLocation) {
        self.record_work("CopyTextureRegion", Command::CopyTextureRegion { dest, source });
    }

    pub fn set_pipeline_state(&mut self, pipeline_state: &PipelineState) {
        self.record(Command::SetPipelineState(pipeline_state.clone()));
    }

    pub fn set_graphics_root_signature(&mut self, root_signature: &RootSignature) {
        self.record(Command::SetRootSignature {
            bind_point: BindPoint::Graphics,
            root_signature: root_signature.clone(),
        });
    }

    pub fn set_compute_root_signature(&mut self, root_signature: &RootSignature) {
        self.record(Command::SetRootSignature {
            bind_point: BindPoint::Compute,
            root_signature: root_signature.clone(),
        });
    }

    pub fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeap]) {
        self.record(Command::SetDescriptorHeaps(heaps.to_vec()));
    }

    pub fn set_graphics_root_constant_buffer_view(
        &mut self,
        root_parameter_index: u32,
        buffer_location: GpuVirtualAddress,
    ) {
        self.record(Command::SetRootConstantBufferView {
            bind_point: BindPoint::Graphics,
            index: root_parameter_index,
            address: buffer_location,
        });
    }

    pub fn set_compute_root_constant_buffer_view(
        &mut self,
        root_parameter_index: u32,
        buffer_location: GpuVirtualAddress,
    ) {
        self.record(Command::SetRootConstantBufferView {
            bind_point: BindPoint::Compute,
            index: root_parameter_index,
            address: buffer_location,
        });
    }

    pub fn set_graphics_root_32bit_constant(
        &mut self,
        root_parameter_index: u32,
        src_data: u32,
        dest_offset: u32,
    ) {
        self.record(Command::SetRoot32BitConstant {
            bind_point: BindPoint::Graphics,
            index: root_parameter_index,
            value: src_data,
            offset: dest_offset,
        });
    }

    pub fn set_graphics_root_descriptor_table(
        &mut self,
        root_parameter_index: u32,
        base_descriptor: GpuDescriptorHandle,
    ) {
        self.record(Command::SetRootDescriptorTable {
            bind_point: BindPoint::Graphics,
            index: root_parameter_index,
            base: base_descriptor,
        });
    }

    pub fn set_compute_root_descriptor_table(
        &mut self,
        root_parameter_index: u32,
        base_descriptor: GpuDescriptorHandle,
    ) {
        self.record(Command::SetRootDescriptorTable {
            bind_point: BindPoint::Compute,
            index: root_parameter_index,
            base: base_descriptor,
        });
    }

    pub fn set_render_targets(
        &mut self,
        descriptors: &[CpuDescriptorHandle],
        depth_stencil: Option<CpuDescriptorHandle>,
    ) {
        if descriptors.len() > 1 {
            report(
                &self.device,
                MessageSeverity::Warning,
                MessageCategory::StateSetting,
                format!(
                    "OMSetRenderTargets: only the first of {} render targets is written",
                    descriptors.len()
                ),
            );
        }
        self.record(Command::SetRenderTargets {
            rtvs: descriptors.to_vec(),
            dsv: depth_stencil,
        });
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.record(Command::SetViewports(viewports.to_vec()));
    }

    pub fn set_scissor_rects(&mut self, scissors: &[Rect]) {
        self.record(Command::SetScissorRects(scissors.to_vec()));
    }

    /// Every draw is a full-screen pass: the pixel shader runs once per
    /// pixel of the viewport clipped to the scissor rect and target
    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        _start_vertex_index: u32,
        _start_instance_location: u32,
    ) {
        self.record_work(
            "DrawInstanced",
            Command::Draw {
                vertex_count,
                instance_count,
            },
        );
    }

    pub fn dispatch(&mut self, thread_group_count_x: u32, thread_group_count_y: u32, thread_group_count_z: u32) {
        self.record_work(
            "Dispatch",
            Command::Dispatch([
                thread_group_count_x,
                thread_group_count_y,
                thread_group_count_z,
            ]),
        );
    }

    /// Pending transitions are flushed into the list before it closes
    pub fn close(&mut self) -> DxResult<()> {
        if self.closed {
            dx_fail!("Close", E_FAIL);
        }
        self.flush_resource_barriers();
        self.recorded = Arc::new(std::mem::take(&mut self.commands));
        self.closed = true;
        Ok(())
    }

    pub fn reset(&mut self) -> DxResult<()> {
        self.commands.clear();
        self.pending_barriers.clear();
        self.closed = false;
        Ok(())
    }
}

/// Validation messages produced by a device
#[derive(Clone)]
pub struct InfoQueue {
    device: Arc<DeviceInner>,
}

impl InfoQueue {
    pub fn new(device: &Device) -> Self {
        Self {
            device: Arc::clone(&device.inner),
        }
    }

    pub fn get_num_stored_messages(&self) -> u64 {
        lock(&self.device.messages).len() as u64
    }

    pub fn get_messages(&self) -> Vec<Message> {
        lock(&self.device.messages).clone()
    }

    pub fn count_at_or_above(&self, severity: MessageSeverity) -> usize {
        lock(&self.device.messages)
            .iter()
            .filter(|message| message.severity <= severity)
            .count()
    }

    pub fn clear_stored_messages(&self) {
        lock(&self.device.messages).clear();
    }

    pub fn print_messages(&self) {
        for message in lock(&self.device.messages).iter() {
            warn!("{}", message);
        }
    }
}
