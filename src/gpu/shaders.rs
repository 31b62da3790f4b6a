//! WGSL sources for the sort-based grid build.
//!
//! Every kernel shares [`common_wgsl`] (grid parameters and agent layout) and
//! binds all of its declared resources, so pipelines can use automatic
//! layouts. Cell codes come from the host, so the device never rounds a
//! position into a cell.

use crate::agent::AGENT_WGSL_STRUCT;

pub const WORKGROUP_SIZE: u32 = 256;

const GRID_PARAMS_WGSL: &str = r#"
const EMPTY: u32 = 0xFFFFFFFFu;

struct GridParams {
    num_agents: u32,
    padded: u32,
    num_touched: u32,
    _pad: u32,
};
"#;

/// Shared prelude prepended to every kernel.
pub fn common_wgsl() -> String {
    format!("{AGENT_WGSL_STRUCT}{GRID_PARAMS_WGSL}")
}

/// Writes the identity permutation and fills key slots past `num_agents`
/// with `EMPTY` so they sort last.
pub const SEED_SORT_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> keys: array<u32>;
@group(0) @binding(1) var<storage, read_write> vals: array<u32>;
@group(0) @binding(2) var<uniform> params: GridParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.padded {
        return;
    }
    vals[i] = i;
    if i >= params.num_agents {
        keys[i] = EMPTY;
    }
}
"#;

/// One compare-exchange stage of a bitonic sort over `(key, val)` pairs.
///
/// Ties on `key` are broken by `val`, which makes the result identical to a
/// stable sort of ids by key.
pub const BITONIC_STAGE_WGSL: &str = r#"
struct StageParams {
    k: u32,
    j: u32,
    count: u32,
    _pad: u32,
};

@group(0) @binding(0) var<storage, read_write> keys: array<u32>;
@group(0) @binding(1) var<storage, read_write> vals: array<u32>;
@group(0) @binding(2) var<uniform> stage: StageParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= stage.count {
        return;
    }
    let partner = i ^ stage.j;
    if partner <= i {
        return;
    }
    let ki = keys[i];
    let kp = keys[partner];
    let vi = vals[i];
    let vp = vals[partner];
    let ascending = (i & stage.k) == 0u;
    let greater = ki > kp || (ki == kp && vi > vp);
    if greater == ascending {
        keys[i] = kp;
        keys[partner] = ki;
        vals[i] = vp;
        vals[partner] = vi;
    }
}
"#;

/// Resets the table entries written by the previous build.
pub const CLEAR_CELLS_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> touched: array<u32>;
@group(0) @binding(1) var<storage, read_write> cell_start: array<u32>;
@group(0) @binding(2) var<storage, read_write> cell_end: array<u32>;
@group(0) @binding(3) var<uniform> params: GridParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.num_touched {
        return;
    }
    let code = touched[i];
    cell_start[code] = EMPTY;
    cell_end[code] = EMPTY;
}
"#;

/// Records `[start, end)` for every run of equal codes.
pub const BUILD_CELLS_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> keys: array<u32>;
@group(0) @binding(1) var<storage, read_write> cell_start: array<u32>;
@group(0) @binding(2) var<storage, read_write> cell_end: array<u32>;
@group(0) @binding(3) var<uniform> params: GridParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.num_agents {
        return;
    }
    let code = keys[i];
    if i == 0u || keys[i - 1u] != code {
        cell_start[code] = i;
    }
    if i + 1u == params.num_agents || keys[i + 1u] != code {
        cell_end[code] = i + 1u;
    }
}
"#;

/// Copies agents into sorted order.
pub const REORDER_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> agents: array<Agent>;
@group(0) @binding(1) var<storage, read> vals: array<u32>;
@group(0) @binding(2) var<storage, read_write> sorted_agents: array<Agent>;
@group(0) @binding(3) var<uniform> params: GridParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.num_agents {
        return;
    }
    sorted_agents[i] = agents[vals[i]];
}
"#;

/// Full source of a kernel with the shared prelude.
pub fn kernel_source(body: &str) -> String {
    format!("{}{}", common_wgsl(), body)
}
