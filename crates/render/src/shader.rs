use crate::device::RenderDevice;
use crate::error::{ShaderError, ShaderStage};
use crate::program::{self, LinkedProgram, UniformBlock, UniformKind, UniformLocation};
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a successfully linked program. Changes on every good load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

struct ActiveProgram<P> {
    id: ProgramId,
    handle: P,
    uniforms: UniformBlock,
}

/// A vertex/fragment program with name-addressed uniforms.
///
/// Uniform values are staged in a CPU-side copy of the uniform block and
/// travel with each draw. Locations are resolved on first use and cached,
/// misses included, until the next successful load.
pub struct Shader<P> {
    active: Option<ActiveProgram<P>>,
    sources: Option<(PathBuf, PathBuf)>,
    locations: HashMap<String, Option<UniformLocation>>,
    uniform_data: Vec<u8>,
    lookups: usize,
    next_id: u64,
}

impl<P> Default for Shader<P> {
    fn default() -> Self {
        Self {
            active: None,
            sources: None,
            locations: HashMap::new(),
            uniform_data: Vec::new(),
            lookups: 0,
            next_id: 1,
        }
    }
}

impl<P> fmt::Debug for Shader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("program", &self.program_id())
            .field("sources", &self.sources)
            .field("cached_locations", &self.locations.len())
            .finish()
    }
}

impl<P> Shader<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, compile and link a program from two WGSL files.
    ///
    /// The paths are remembered for [`Shader::reload`] even when loading
    /// fails. On failure the previously active program stays active.
    pub fn load<D>(
        &mut self,
        device: &mut D,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<ProgramId, ShaderError>
    where
        D: RenderDevice<Program = P>,
    {
        let vertex_path = vertex_path.as_ref().to_path_buf();
        let fragment_path = fragment_path.as_ref().to_path_buf();
        self.sources = Some((vertex_path.clone(), fragment_path.clone()));

        let vertex_source = read_source(&vertex_path)?;
        let fragment_source = read_source(&fragment_path)?;
        self.load_sources(device, &vertex_source, &fragment_source)
    }

    /// Load again from the paths given to the last [`Shader::load`].
    pub fn reload<D>(&mut self, device: &mut D) -> Result<ProgramId, ShaderError>
    where
        D: RenderDevice<Program = P>,
    {
        let (vertex_path, fragment_path) =
            self.sources.clone().ok_or(ShaderError::NothingToReload)?;
        self.load(device, vertex_path, fragment_path)
    }

    /// Compile and link from in-memory sources.
    ///
    /// Both stages are compiled before any error is returned so each stage
    /// gets its own diagnostic.
    pub fn load_sources<D>(
        &mut self,
        device: &mut D,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, ShaderError>
    where
        D: RenderDevice<Program = P>,
    {
        let vertex = program::compile(ShaderStage::Vertex, vertex_source);
        let fragment = program::compile(ShaderStage::Fragment, fragment_source);
        for err in [vertex.as_ref().err(), fragment.as_ref().err()].into_iter().flatten() {
            tracing::error!("{err}");
        }

        let linked = program::link(vertex?, fragment?).inspect_err(|e| tracing::error!("{e}"))?;
        let handle = device
            .create_program(&linked)
            .map_err(ShaderError::from)
            .inspect_err(|e| tracing::error!("{e}"))?;

        Ok(self.activate(linked, handle))
    }

    fn activate(&mut self, linked: LinkedProgram, handle: P) -> ProgramId {
        let id = ProgramId(self.next_id);
        self.next_id += 1;
        self.locations.clear();
        self.uniform_data = vec![0; linked.uniforms.size as usize];
        tracing::info!(
            "linked {id} ({} uniforms, {} bytes)",
            linked.uniforms.members.len(),
            linked.uniforms.size
        );
        self.active = Some(ActiveProgram {
            id,
            handle,
            uniforms: linked.uniforms,
        });
        id
    }

    /// Make this program current on `device`. No-op if nothing ever linked.
    pub fn bind<D>(&self, device: &mut D)
    where
        D: RenderDevice<Program = P>,
    {
        if let Some(active) = &self.active {
            device.bind_program(&active.handle);
        }
    }

    pub fn program_id(&self) -> Option<ProgramId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Resolve `name`, consulting the cache first.
    pub fn uniform_location(&mut self, name: &str) -> Option<UniformLocation> {
        if let Some(cached) = self.locations.get(name) {
            return *cached;
        }
        self.lookups += 1;
        let location = self
            .active
            .as_ref()
            .and_then(|a| a.uniforms.location(name));
        if location.is_none() {
            tracing::trace!("uniform `{name}` not found in active program");
        }
        self.locations.insert(name.to_owned(), location);
        location
    }

    /// Number of uncached location lookups performed so far.
    pub fn uniform_lookups(&self) -> usize {
        self.lookups
    }

    pub fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.write(name, UniformKind::Mat4, bytemuck::bytes_of(&value.to_cols_array()));
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.write(name, UniformKind::Vec3, bytemuck::bytes_of(&value.to_array()));
    }

    fn write(&mut self, name: &str, kind: UniformKind, bytes: &[u8]) {
        let Some(location) = self.uniform_location(name) else {
            return;
        };
        if location.kind != kind {
            tracing::trace!("uniform `{name}` is {:?}, not {kind:?}", location.kind);
            return;
        }
        let start = location.offset as usize;
        if let Some(slot) = self.uniform_data.get_mut(start..start + bytes.len()) {
            slot.copy_from_slice(bytes);
        }
    }

    /// Current contents of the uniform block.
    pub fn uniform_data(&self) -> &[u8] {
        &self.uniform_data
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| {
        let err = ShaderError::Io {
            path: path.to_path_buf(),
            source,
        };
        tracing::error!("{err}");
        err
    })
}
