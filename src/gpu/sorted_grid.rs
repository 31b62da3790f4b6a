//! Sort-based grid built with compute passes.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rayon::prelude::*;
use tracing::debug;
use wgpu::util::DeviceExt;

use super::shaders::{
    kernel_source, BITONIC_STAGE_WGSL, BUILD_CELLS_WGSL, CLEAR_CELLS_WGSL, REORDER_WGSL,
    SEED_SORT_WGSL, WORKGROUP_SIZE,
};
use super::{create_compute_pipeline, read_buffer, staging_buffer, storage_buffer, GpuContext};
use crate::agent::Agent;
use crate::error::{GpuError, GridError};
use crate::spatial::morton::table_len;
use crate::spatial::{GridConfig, GridIndex, GridStats, GridStrategy, SortedGrid};

const AGENT_SIZE: u64 = std::mem::size_of::<Agent>() as u64;
const WORD: u64 = 4;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct GridParams {
    num_agents: u32,
    padded: u32,
    num_touched: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct StageParams {
    k: u32,
    j: u32,
    count: u32,
    _pad: u32,
}

/// Buffers sized for a given agent capacity. Rebuilt when the population
/// outgrows them.
struct Buffers {
    capacity: usize,
    padded: usize,
    agents: wgpu::Buffer,
    sorted_agents: wgpu::Buffer,
    keys: wgpu::Buffer,
    vals: wgpu::Buffer,
    touched: wgpu::Buffer,
    read_agents: wgpu::Buffer,
    read_keys: wgpu::Buffer,
    read_vals: wgpu::Buffer,
    seed_group: wgpu::BindGroup,
    clear_group: wgpu::BindGroup,
    build_group: wgpu::BindGroup,
    reorder_group: wgpu::BindGroup,
    // one uniform per bitonic stage; a single rewritten uniform would only
    // hold its last value by the time the encoder runs
    stage_groups: Vec<wgpu::BindGroup>,
}

pub struct GpuSortedGrid {
    ctx: GpuContext,
    config: GridConfig,
    host: SortedGrid,
    params: wgpu::Buffer,
    cell_start: wgpu::Buffer,
    cell_end: wgpu::Buffer,
    read_cell_start: wgpu::Buffer,
    read_cell_end: wgpu::Buffer,
    seed_pipeline: wgpu::ComputePipeline,
    bitonic_pipeline: wgpu::ComputePipeline,
    clear_pipeline: wgpu::ComputePipeline,
    build_pipeline: wgpu::ComputePipeline,
    reorder_pipeline: wgpu::ComputePipeline,
    buffers: Option<Buffers>,
    // codes still set in the device tables after a host-side clear
    pending_reset: Vec<u32>,
}

impl GpuSortedGrid {
    /// Creates a device and allocates the dense cell tables.
    pub fn new(config: GridConfig) -> Result<Self, GpuError> {
        Self::with_context(GpuContext::new()?, config)
    }

    pub fn with_context(ctx: GpuContext, config: GridConfig) -> Result<Self, GpuError> {
        let cells = table_len(config.resolution) as u64;
        let limits = ctx.device.limits();
        let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if cells * WORD > limit {
            return Err(GpuError::GridTooLarge { cells, limit });
        }

        let device = &ctx.device;
        let empty_table = vec![u32::MAX; cells as usize];
        let table = |label: &str| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&empty_table),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            })
        };
        let cell_start = table("Cell Start");
        let cell_end = table("Cell End");

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Params"),
            size: std::mem::size_of::<GridParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let grid = Self {
            read_cell_start: staging_buffer(device, "Cell Start Readback", cells * WORD),
            read_cell_end: staging_buffer(device, "Cell End Readback", cells * WORD),
            seed_pipeline: create_compute_pipeline(device, &kernel_source(SEED_SORT_WGSL), "Seed Sort"),
            bitonic_pipeline: create_compute_pipeline(device, &kernel_source(BITONIC_STAGE_WGSL), "Bitonic Stage"),
            clear_pipeline: create_compute_pipeline(device, &kernel_source(CLEAR_CELLS_WGSL), "Clear Cells"),
            build_pipeline: create_compute_pipeline(device, &kernel_source(BUILD_CELLS_WGSL), "Build Cells"),
            reorder_pipeline: create_compute_pipeline(device, &kernel_source(REORDER_WGSL), "Reorder Agents"),
            host: SortedGrid::new(config),
            config,
            params,
            cell_start,
            cell_end,
            buffers: None,
            pending_reset: Vec::new(),
            ctx,
        };
        Ok(grid)
    }

    /// Host copy of the last build.
    pub fn host(&self) -> &SortedGrid {
        &self.host
    }

    fn agent_limit(&self) -> usize {
        let limits = self.ctx.device.limits();
        let bytes = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        let by_memory = (bytes / AGENT_SIZE) as usize;
        let by_dispatch = limits.max_compute_workgroups_per_dimension as usize * WORKGROUP_SIZE as usize;
        // the padded sort buffer must fit as well
        (by_memory.min(by_dispatch) + 1).next_power_of_two() / 2
    }

    fn ensure_capacity(&mut self, count: usize) {
        if self.buffers.as_ref().is_some_and(|b| b.capacity >= count) {
            return;
        }
        let capacity = count.next_power_of_two().max(WORKGROUP_SIZE as usize);
        let padded = capacity;
        let device = &self.ctx.device;

        let agents = storage_buffer(device, "Agents", capacity as u64 * AGENT_SIZE);
        let sorted_agents = storage_buffer(device, "Sorted Agents", capacity as u64 * AGENT_SIZE);
        let keys = storage_buffer(device, "Cell Codes", padded as u64 * WORD);
        let vals = storage_buffer(device, "Agent Ids", padded as u64 * WORD);
        let touched = storage_buffer(device, "Touched Cells", capacity as u64 * WORD);

        let group = |label: &str, pipeline: &wgpu::ComputePipeline, buffers: &[&wgpu::Buffer]| {
            let entries: Vec<_> = buffers
                .iter()
                .enumerate()
                .map(|(binding, buffer)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            })
        };

        let seed_group = group("Seed Sort", &self.seed_pipeline, &[&keys, &vals, &self.params]);
        let clear_group = group(
            "Clear Cells",
            &self.clear_pipeline,
            &[&touched, &self.cell_start, &self.cell_end, &self.params],
        );
        let build_group = group(
            "Build Cells",
            &self.build_pipeline,
            &[&keys, &self.cell_start, &self.cell_end, &self.params],
        );
        let reorder_group = group(
            "Reorder Agents",
            &self.reorder_pipeline,
            &[&agents, &vals, &sorted_agents, &self.params],
        );

        let mut stage_groups = Vec::new();
        let mut k = 2;
        while k <= padded {
            let mut j = k / 2;
            while j > 0 {
                let stage = StageParams {
                    k: k as u32,
                    j: j as u32,
                    count: padded as u32,
                    _pad: 0,
                };
                let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Bitonic Stage Params"),
                    contents: bytemuck::bytes_of(&stage),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                stage_groups.push(group("Bitonic Stage", &self.bitonic_pipeline, &[&keys, &vals, &uniform]));
                j /= 2;
            }
            k *= 2;
        }

        debug!(capacity, stages = stage_groups.len(), "allocated gpu grid buffers");
        self.buffers = Some(Buffers {
            capacity,
            padded,
            read_agents: staging_buffer(device, "Sorted Agents Readback", capacity as u64 * AGENT_SIZE),
            read_keys: staging_buffer(device, "Cell Codes Readback", capacity as u64 * WORD),
            read_vals: staging_buffer(device, "Agent Ids Readback", capacity as u64 * WORD),
            agents,
            sorted_agents,
            keys,
            vals,
            touched,
            seed_group,
            clear_group,
            build_group,
            reorder_group,
            stage_groups,
        });
    }

    /// Sorts `codes` on the device and reads the finished build back into the
    /// host grid. `codes[i]` is the cell code of `agents[i]`.
    fn run_build(&mut self, agents: &[Agent], codes: &[u32]) -> Result<(), GpuError> {
        let n = agents.len();
        self.ensure_capacity(n);
        let mut touched = std::mem::take(&mut self.pending_reset);
        touched.extend_from_slice(self.host.touched());
        let Some(buffers) = self.buffers.as_ref() else {
            return Ok(());
        };
        let params = GridParams {
            num_agents: n as u32,
            padded: buffers.padded as u32,
            num_touched: touched.len() as u32,
            _pad: 0,
        };

        let queue = &self.ctx.queue;
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
        if !touched.is_empty() {
            queue.write_buffer(&buffers.touched, 0, bytemuck::cast_slice(&touched));
        }
        if n > 0 {
            queue.write_buffer(&buffers.agents, 0, bytemuck::cast_slice(agents));
            queue.write_buffer(&buffers.keys, 0, bytemuck::cast_slice(codes));
        }

        let groups = |count: usize| (count as u32).div_ceil(WORKGROUP_SIZE).max(1);
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Grid Build"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Grid Build"),
                timestamp_writes: None,
            });

            if !touched.is_empty() {
                pass.set_pipeline(&self.clear_pipeline);
                pass.set_bind_group(0, &buffers.clear_group, &[]);
                pass.dispatch_workgroups(groups(touched.len()), 1, 1);
            }

            if n > 0 {
                pass.set_pipeline(&self.seed_pipeline);
                pass.set_bind_group(0, &buffers.seed_group, &[]);
                pass.dispatch_workgroups(groups(buffers.padded), 1, 1);

                pass.set_pipeline(&self.bitonic_pipeline);
                for stage in &buffers.stage_groups {
                    pass.set_bind_group(0, stage, &[]);
                    pass.dispatch_workgroups(groups(buffers.padded), 1, 1);
                }

                pass.set_pipeline(&self.build_pipeline);
                pass.set_bind_group(0, &buffers.build_group, &[]);
                pass.dispatch_workgroups(groups(n), 1, 1);

                pass.set_pipeline(&self.reorder_pipeline);
                pass.set_bind_group(0, &buffers.reorder_group, &[]);
                pass.dispatch_workgroups(groups(n), 1, 1);
            }
        }

        let cells = table_len(self.config.resolution) as u64;
        encoder.copy_buffer_to_buffer(&self.cell_start, 0, &self.read_cell_start, 0, cells * WORD);
        encoder.copy_buffer_to_buffer(&self.cell_end, 0, &self.read_cell_end, 0, cells * WORD);
        if n > 0 {
            let n = n as u64;
            encoder.copy_buffer_to_buffer(&buffers.keys, 0, &buffers.read_keys, 0, n * WORD);
            encoder.copy_buffer_to_buffer(&buffers.vals, 0, &buffers.read_vals, 0, n * WORD);
            encoder.copy_buffer_to_buffer(&buffers.sorted_agents, 0, &buffers.read_agents, 0, n * AGENT_SIZE);
        }
        queue.submit(Some(encoder.finish()));

        let device = &self.ctx.device;
        let sorted_codes = read_buffer::<u32>(device, &buffers.read_keys, n)?;
        let sorted_ids = read_buffer::<u32>(device, &buffers.read_vals, n)?;
        let sorted_agents = read_buffer::<Agent>(device, &buffers.read_agents, n)?;
        let cell_start = read_buffer::<u32>(device, &self.read_cell_start, cells as usize)?;
        let cell_end = read_buffer::<u32>(device, &self.read_cell_end, cells as usize)?;

        self.host
            .load_build(sorted_ids, sorted_codes, sorted_agents, cell_start, cell_end);
        Ok(())
    }
}

impl GridIndex for GpuSortedGrid {
    fn strategy(&self) -> GridStrategy {
        GridStrategy::SortedGpu
    }

    fn build(&mut self, agents: &[Agent]) -> Result<(), GridError> {
        let limit = self.agent_limit();
        if agents.len() > limit {
            return Err(GridError::TooManyAgents {
                agents: agents.len(),
                limit,
            });
        }
        let config = self.config;
        let codes = agents
            .par_iter()
            .enumerate()
            .map(|(id, agent)| SortedGrid::code_for(&config, id, agent))
            .collect::<Result<Vec<u32>, GridError>>()?;

        self.run_build(agents, &codes).map_err(|err| GridError::Device(err.to_string()))
    }

    fn clear(&mut self) {
        // device entries are reset at the start of the next build
        self.pending_reset.extend_from_slice(self.host.touched());
        self.host.clear();
    }

    fn visit_candidates(&self, agents: &[Agent], position: Vec3, visitor: &mut dyn FnMut(usize, &Agent)) {
        self.host.visit_candidates(agents, position, visitor);
    }

    fn stats(&self) -> GridStats {
        self.host.stats()
    }
}
