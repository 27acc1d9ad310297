//! WGSL compilation and linking.
//!
//! Each stage is parsed and validated on its own with `naga`. Linking checks
//! that the two stages agree on their shared interface and reflects the
//! uniform block so uniforms can be addressed by name.

use crate::error::{ShaderError, ShaderStage};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use std::collections::{BTreeMap, BTreeSet};

/// Bind group and binding of the one uniform block a program may declare.
pub const UNIFORM_GROUP: u32 = 0;
pub const UNIFORM_BINDING: u32 = 0;

/// Shape of a uniform as reflected from the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Mat4,
    Vec3,
    Other { size: u32 },
}

impl UniformKind {
    pub fn size(self) -> u32 {
        match self {
            UniformKind::Mat4 => 64,
            UniformKind::Vec3 => 12,
            UniformKind::Other { size } => size,
        }
    }
}

/// Where a named uniform lives inside the program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Reflected layout of the program's uniform block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformBlock {
    /// Size in bytes, including trailing padding.
    pub size: u32,
    pub members: BTreeMap<String, UniformLocation>,
}

impl UniformBlock {
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.members.get(name).copied()
    }
}

/// One successfully compiled stage.
#[derive(Debug)]
pub struct CompiledStage {
    source: String,
    module: naga::Module,
}

/// A vertex/fragment pair that compiled and linked.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex_source: String,
    pub fragment_source: String,
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub uniforms: UniformBlock,
}

/// Parse and validate one stage's WGSL source.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledStage, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
        stage,
        log: e.emit_to_string(source),
    })?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| ShaderError::Compile {
            stage,
            log: e.to_string(),
        })?;

    Ok(CompiledStage {
        source: source.to_owned(),
        module,
    })
}

/// Check that two compiled stages form a usable program.
pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<LinkedProgram, ShaderError> {
    let vs = entry_point(&vertex.module, naga::ShaderStage::Vertex)
        .ok_or_else(|| link_error("vertex source has no @vertex entry point"))?;
    let fs = entry_point(&fragment.module, naga::ShaderStage::Fragment)
        .ok_or_else(|| link_error("fragment source has no @fragment entry point"))?;

    let mut produced = BTreeSet::new();
    if let Some(result) = &vs.function.result {
        collect_locations(&vertex.module, result.ty, result.binding.as_ref(), &mut produced);
    }
    let mut consumed = BTreeSet::new();
    for arg in &fs.function.arguments {
        collect_locations(&fragment.module, arg.ty, arg.binding.as_ref(), &mut consumed);
    }
    if let Some(missing) = consumed.difference(&produced).next() {
        return Err(link_error(format!(
            "fragment input @location({missing}) is not written by the vertex stage"
        )));
    }

    let vertex_block = reflect_uniforms(&vertex.module)?;
    let fragment_block = reflect_uniforms(&fragment.module)?;
    let uniforms = merge_blocks(vertex_block, fragment_block)?;

    Ok(LinkedProgram {
        vertex_entry: vs.name.clone(),
        fragment_entry: fs.name.clone(),
        vertex_source: vertex.source,
        fragment_source: fragment.source,
        uniforms,
    })
}

fn link_error(log: impl Into<String>) -> ShaderError {
    ShaderError::Link { log: log.into() }
}

fn entry_point(module: &naga::Module, stage: naga::ShaderStage) -> Option<&naga::EntryPoint> {
    module.entry_points.iter().find(|ep| ep.stage == stage)
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn uniform_kind(module: &naga::Module, ty: naga::Handle<naga::Type>) -> UniformKind {
    let inner = &module.types[ty].inner;
    match *inner {
        naga::TypeInner::Matrix {
            columns: naga::VectorSize::Quad,
            rows: naga::VectorSize::Quad,
            scalar,
        } if scalar == naga::Scalar::F32 => UniformKind::Mat4,
        naga::TypeInner::Vector {
            size: naga::VectorSize::Tri,
            scalar,
        } if scalar == naga::Scalar::F32 => UniformKind::Vec3,
        _ => UniformKind::Other {
            size: inner.size(module.to_ctx()),
        },
    }
}

fn reflect_uniforms(module: &naga::Module) -> Result<Option<UniformBlock>, ShaderError> {
    let mut block = None;
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let at_expected_slot = var
            .binding
            .as_ref()
            .is_some_and(|b| b.group == UNIFORM_GROUP && b.binding == UNIFORM_BINDING);
        if !at_expected_slot || block.is_some() {
            return Err(link_error(format!(
                "only one uniform block at @group({UNIFORM_GROUP}) @binding({UNIFORM_BINDING}) is supported"
            )));
        }

        let ty = &module.types[var.ty];
        let mut members = BTreeMap::new();
        match &ty.inner {
            naga::TypeInner::Struct { members: fields, .. } => {
                for field in fields {
                    if let Some(name) = &field.name {
                        members.insert(
                            name.clone(),
                            UniformLocation {
                                offset: field.offset,
                                kind: uniform_kind(module, field.ty),
                            },
                        );
                    }
                }
            }
            _ => {
                if let Some(name) = &var.name {
                    members.insert(
                        name.clone(),
                        UniformLocation {
                            offset: 0,
                            kind: uniform_kind(module, var.ty),
                        },
                    );
                }
            }
        }
        block = Some(UniformBlock {
            size: ty.inner.size(module.to_ctx()),
            members,
        });
    }
    Ok(block)
}

fn merge_blocks(
    vertex: Option<UniformBlock>,
    fragment: Option<UniformBlock>,
) -> Result<UniformBlock, ShaderError> {
    let (mut merged, other) = match (vertex, fragment) {
        (Some(v), Some(f)) => (v, f),
        (Some(only), None) | (None, Some(only)) => return Ok(only),
        (None, None) => return Ok(UniformBlock::default()),
    };
    for (name, location) in other.members {
        match merged.members.get(&name) {
            Some(existing) if *existing != location => {
                return Err(link_error(format!(
                    "uniform `{name}` differs between stages ({existing:?} vs {location:?})"
                )));
            }
            Some(_) => {}
            None => {
                merged.members.insert(name, location);
            }
        }
    }
    merged.size = merged.size.max(other.size);
    check_disjoint(&merged)?;
    Ok(merged)
}

/// Both stages read the same buffer, so no two members may share bytes.
fn check_disjoint(block: &UniformBlock) -> Result<(), ShaderError> {
    let mut ranges: Vec<_> = block
        .members
        .iter()
        .map(|(name, loc)| (loc.offset, loc.offset + loc.kind.size(), name))
        .collect();
    ranges.sort();

    let mut previous: Option<(u32, &String)> = None;
    for (start, end, name) in ranges {
        if let Some((_, prev_name)) = previous.filter(|&(prev_end, _)| start < prev_end) {
            return Err(link_error(format!(
                "uniforms `{prev_name}` and `{name}` overlap in the uniform block"
            )));
        }
        if previous.is_none_or(|(prev_end, _)| end > prev_end) {
            previous = Some((end, name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIFORMS: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    model: mat4x4<f32>,
    color: vec3<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
"#;

    fn vertex_src() -> String {
        format!(
            "{UNIFORMS}
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {{
    return u.projection * u.view * u.model * vec4<f32>(position, 1.0);
}}"
        )
    }

    fn fragment_src() -> String {
        format!(
            "{UNIFORMS}
@fragment
fn fs_main() -> @location(0) vec4<f32> {{
    return vec4<f32>(u.color, 1.0);
}}"
        )
    }

    fn link_sources(vs: &str, fs: &str) -> Result<LinkedProgram, ShaderError> {
        link(
            compile(ShaderStage::Vertex, vs)?,
            compile(ShaderStage::Fragment, fs)?,
        )
    }

    #[test]
    fn reflects_uniform_offsets() {
        let program = link_sources(&vertex_src(), &fragment_src()).unwrap();
        let block = &program.uniforms;
        assert_eq!(block.size, 208);
        assert_eq!(
            block.location("projection"),
            Some(UniformLocation { offset: 0, kind: UniformKind::Mat4 })
        );
        assert_eq!(block.location("model").map(|l| l.offset), Some(128));
        assert_eq!(
            block.location("color"),
            Some(UniformLocation { offset: 192, kind: UniformKind::Vec3 })
        );
        assert_eq!(block.location("missing"), None);
        assert_eq!(program.vertex_entry, "vs_main");
        assert_eq!(program.fragment_entry, "fs_main");
    }

    #[test]
    fn syntax_error_is_tagged_with_stage() {
        let err = compile(ShaderStage::Fragment, "fn broken( {").unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Fragment));
    }

    #[test]
    fn type_error_is_a_compile_error() {
        let src = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return 1.0; }";
        let err = compile(ShaderStage::Vertex, src).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::Compile { stage: ShaderStage::Vertex, .. }
        ));
    }

    #[test]
    fn stages_swapped_fails_to_link() {
        let err = link_sources(&fragment_src(), &vertex_src()).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }

    #[test]
    fn fragment_input_must_be_produced() {
        let fs = "@fragment fn fs_main(@location(3) tint: vec4<f32>) -> @location(0) vec4<f32> { return tint; }";
        let err = link_sources(&vertex_src(), fs).unwrap_err();
        assert!(err.to_string().contains("@location(3)"));
    }

    #[test]
    fn mismatched_uniform_types_fail_to_link() {
        let fs = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    model: mat4x4<f32>,
    color: vec4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
@fragment fn fs_main() -> @location(0) vec4<f32> { return u.color; }
"#;
        let err = link_sources(&vertex_src(), fs).unwrap_err();
        assert!(err.to_string().contains("color"));
    }

    #[test]
    fn overlapping_uniform_structs_fail_to_link() {
        let fs = r#"
struct FragUniforms {
    tint: vec3<f32>,
};
@group(0) @binding(0) var<uniform> f: FragUniforms;
@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(f.tint, 1.0); }
"#;
        let err = link_sources(&vertex_src(), fs).unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Program));
        let msg = err.to_string();
        assert!(msg.contains("projection") && msg.contains("tint"), "{msg}");
    }

    #[test]
    fn fragment_struct_sharing_the_prefix_links() {
        let fs = r#"
struct Uniforms {
    projection: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;
@fragment fn fs_main() -> @location(0) vec4<f32> { return u.projection[0]; }
"#;
        let program = link_sources(&vertex_src(), fs).unwrap();
        assert_eq!(program.uniforms.size, 208);
        assert_eq!(
            program.uniforms.location("color"),
            Some(UniformLocation { offset: 192, kind: UniformKind::Vec3 })
        );
    }

    #[test]
    fn kind_sizes_cover_their_bytes() {
        assert_eq!(UniformKind::Mat4.size(), 64);
        assert_eq!(UniformKind::Vec3.size(), 12);
        assert_eq!(UniformKind::Other { size: 16 }.size(), 16);
    }

    #[test]
    fn stage_without_uniforms_links() {
        let fs = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let program = link_sources(&vertex_src(), fs).unwrap();
        assert_eq!(program.uniforms.size, 208);
        assert!(program.uniforms.location("color").is_some());
    }
}
