//! Program sources and symbol reflection.
//!
//! Every program kind ships a GLSL 450 vertex/fragment pair. Before any GPU
//! object is created the pair is parsed and validated with naga, the stage
//! interfaces are checked against each other, and the fixed set of symbols
//! each kind needs is resolved to a [`Location`]. Symbols that cannot be
//! found resolve to [`Location::Invalid`]; writes to them are dropped later.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};
use wgpu::naga::{self, front::glsl, valid, ShaderStage};

/// The five draw programs the compositor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Solid colour quad.
    Flat,
    /// One texture; still images and the FPS overlay.
    Texture,
    /// Horizontally repeating, scrolling texture.
    Ticker,
    /// Two textures mixed by progress.
    Crossfade,
    /// Latest decoded video frame.
    Video,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 5] = [
        ProgramKind::Flat,
        ProgramKind::Texture,
        ProgramKind::Ticker,
        ProgramKind::Crossfade,
        ProgramKind::Video,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Flat => "flat",
            ProgramKind::Texture => "texture",
            ProgramKind::Ticker => "ticker",
            ProgramKind::Crossfade => "crossfade",
            ProgramKind::Video => "video",
        }
    }

    /// Built-in `(vertex, fragment)` GLSL for this kind.
    pub fn sources(self) -> (&'static str, &'static str) {
        match self {
            ProgramKind::Flat => (FLAT_VERTEX, FLAT_FRAGMENT),
            ProgramKind::Texture => (TEXTURED_VERTEX, TEXTURE_FRAGMENT),
            ProgramKind::Ticker => (TICKER_VERTEX, TICKER_FRAGMENT),
            ProgramKind::Crossfade => (CROSSFADE_VERTEX, CROSSFADE_FRAGMENT),
            ProgramKind::Video => (VIDEO_VERTEX, VIDEO_FRAGMENT),
        }
    }

    /// Symbols resolved and cached for this kind.
    pub fn symbols(self) -> &'static [Symbol] {
        use Symbol::*;
        match self {
            ProgramKind::Flat => &[Position, MvpMatrix, Color],
            ProgramKind::Texture | ProgramKind::Video => {
                &[Position, TexCoord, MvpMatrix, Texture, Sampler]
            }
            ProgramKind::Ticker => &[
                Position,
                TexCoord,
                MvpMatrix,
                Texture,
                Sampler,
                ScrollOffset,
                SmoothFactor,
                Repeat,
            ],
            ProgramKind::Crossfade => &[
                Position,
                TexCoord,
                MvpMatrix,
                Texture,
                SecondTexture,
                Sampler,
                Progress,
            ],
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Symbolic attribute, uniform and texture names shared by all programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Position,
    TexCoord,
    MvpMatrix,
    Color,
    Texture,
    SecondTexture,
    Sampler,
    ScrollOffset,
    SmoothFactor,
    Repeat,
    Progress,
}

impl Symbol {
    pub fn glsl_name(self) -> &'static str {
        match self {
            Symbol::Position => "vPosition",
            Symbol::TexCoord => "aTexCoord",
            Symbol::MvpMatrix => "uMVPMatrix",
            Symbol::Color => "uColor",
            Symbol::Texture => "uTexture",
            Symbol::SecondTexture => "uTexture2",
            Symbol::Sampler => "uSampler",
            Symbol::ScrollOffset => "uOffset",
            Symbol::SmoothFactor => "uSmoothFactor",
            Symbol::Repeat => "uRepeat",
            Symbol::Progress => "uProgress",
        }
    }
}

/// Where a symbol lives once the program is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Vertex input location.
    Attribute(u32),
    /// Byte range inside the program's uniform block.
    Uniform { offset: u32, size: u32 },
    /// Texture or sampler slot.
    Binding { group: u32, binding: u32 },
    /// Not found; binds to it are skipped.
    Invalid,
}

impl Location {
    pub fn is_valid(self) -> bool {
        self != Location::Invalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub(crate) fn naga(self) -> ShaderStage {
        match self {
            StageKind::Vertex => ShaderStage::Vertex,
            StageKind::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{stage} stage of the {program} program failed to compile:\n{diagnostic}")]
    Stage {
        program: ProgramKind,
        stage: StageKind,
        diagnostic: String,
    },

    #[error("the {program} program failed to link: {diagnostic}")]
    Link {
        program: ProgramKind,
        diagnostic: String,
    },
}

/// Resolved symbol table for one linked program. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInfo {
    kind: ProgramKind,
    locations: HashMap<Symbol, Location>,
    uniform_size: u32,
}

impl ProgramInfo {
    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    /// Location of `symbol`, or [`Location::Invalid`] when it was not found.
    pub fn location(&self, symbol: Symbol) -> Location {
        self.locations
            .get(&symbol)
            .copied()
            .unwrap_or(Location::Invalid)
    }

    pub fn attribute(&self, symbol: Symbol) -> Option<u32> {
        match self.location(symbol) {
            Location::Attribute(location) => Some(location),
            _ => None,
        }
    }

    /// `(symbol, group, binding)` for every resolved texture or sampler.
    pub fn resource_bindings(&self) -> Vec<(Symbol, u32, u32)> {
        let mut bindings: Vec<_> = self
            .kind
            .symbols()
            .iter()
            .filter_map(|symbol| match self.location(*symbol) {
                Location::Binding { group, binding } => Some((*symbol, group, binding)),
                _ => None,
            })
            .collect();
        bindings.sort_by_key(|(_, group, binding)| (*group, *binding));
        bindings
    }

    /// Size in bytes of the program's uniform block.
    pub fn uniform_size(&self) -> u32 {
        self.uniform_size
    }
}

/// Reflected programs keyed by kind. Kinds that failed to build are absent.
#[derive(Debug, Clone, Default)]
pub struct ProgramTable {
    programs: HashMap<ProgramKind, ProgramInfo>,
}

impl ProgramTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reflects every built-in program, logging and omitting failures.
    pub fn reflect_builtin() -> Self {
        let mut table = Self::new();
        for kind in ProgramKind::ALL {
            let (vertex, fragment) = kind.sources();
            match compile(kind, vertex, fragment) {
                Ok(info) => table.insert(info),
                Err(err) => tracing::error!(program = %kind, "{err}"),
            }
        }
        table
    }

    pub fn insert(&mut self, info: ProgramInfo) {
        self.programs.insert(info.kind, info);
    }

    pub fn remove(&mut self, kind: ProgramKind) -> Option<ProgramInfo> {
        self.programs.remove(&kind)
    }

    pub fn get(&self, kind: ProgramKind) -> Option<&ProgramInfo> {
        self.programs.get(&kind)
    }

    pub fn contains(&self, kind: ProgramKind) -> bool {
        self.programs.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Parses, validates and links a program, then resolves its symbols.
///
/// A stage that fails to compile stops the build before linking. Missing
/// symbols are logged and cached as [`Location::Invalid`].
pub fn compile(
    kind: ProgramKind,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<ProgramInfo, CompileError> {
    let vertex = parse_stage(kind, StageKind::Vertex, vertex_source)?;
    let fragment = parse_stage(kind, StageKind::Fragment, fragment_source)?;
    link(kind, &vertex, &fragment)?;

    let mut locations = HashMap::new();
    for symbol in kind.symbols() {
        let resolved = resolve(&vertex, symbol.glsl_name())
            .or_else(|| resolve(&fragment, symbol.glsl_name()));
        let location = match resolved {
            Some(location) => location,
            None => {
                warn!(
                    program = %kind,
                    symbol = symbol.glsl_name(),
                    "expected symbol not found; binds to it will be skipped"
                );
                Location::Invalid
            }
        };
        locations.insert(*symbol, location);
    }

    let uniform_size = uniform_block_size(&vertex).max(uniform_block_size(&fragment));
    debug!(program = %kind, uniform_size, "reflected program");
    Ok(ProgramInfo {
        kind,
        locations,
        uniform_size,
    })
}

fn parse_stage(
    kind: ProgramKind,
    stage: StageKind,
    source: &str,
) -> Result<naga::Module, CompileError> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(stage.naga()), source)
        .map_err(|errors| CompileError::Stage {
            program: kind,
            stage,
            diagnostic: errors.emit_to_string(source),
        })?;

    valid::Validator::new(valid::ValidationFlags::all(), valid::Capabilities::default())
        .validate(&module)
        .map_err(|err| CompileError::Stage {
            program: kind,
            stage,
            diagnostic: err.to_string(),
        })?;
    Ok(module)
}

fn entry_point(module: &naga::Module, stage: ShaderStage) -> Option<&naga::EntryPoint> {
    module.entry_points.iter().find(|entry| entry.stage == stage)
}

/// Every fragment input must be written by the vertex stage.
fn link(
    kind: ProgramKind,
    vertex: &naga::Module,
    fragment: &naga::Module,
) -> Result<(), CompileError> {
    let link_error = |diagnostic: String| CompileError::Link {
        program: kind,
        diagnostic,
    };
    let vs = entry_point(vertex, ShaderStage::Vertex)
        .ok_or_else(|| link_error("vertex source has no vertex entry point".into()))?;
    let fs = entry_point(fragment, ShaderStage::Fragment)
        .ok_or_else(|| link_error("fragment source has no fragment entry point".into()))?;

    let outputs = output_locations(vertex, &vs.function);
    for argument in &fs.function.arguments {
        if let Some(naga::Binding::Location { location, .. }) = argument.binding {
            if !outputs.contains(&location) {
                return Err(link_error(format!(
                    "fragment input '{}' at location {location} is not written by the vertex stage",
                    argument.name.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }
    }
    Ok(())
}

fn output_locations(module: &naga::Module, function: &naga::Function) -> Vec<u32> {
    let Some(result) = &function.result else {
        return Vec::new();
    };
    if let Some(naga::Binding::Location { location, .. }) = result.binding {
        return vec![location];
    }
    match &module.types[result.ty].inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .filter_map(|member| match member.binding {
                Some(naga::Binding::Location { location, .. }) => Some(location),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve(module: &naga::Module, name: &str) -> Option<Location> {
    if let Some(vs) = entry_point(module, ShaderStage::Vertex) {
        for argument in &vs.function.arguments {
            if argument.name.as_deref() != Some(name) {
                continue;
            }
            if let Some(naga::Binding::Location { location, .. }) = argument.binding {
                return Some(Location::Attribute(location));
            }
        }
    }

    for (_, global) in module.global_variables.iter() {
        if global.name.as_deref() == Some(name) {
            if let Some(binding) = &global.binding {
                return Some(Location::Binding {
                    group: binding.group,
                    binding: binding.binding,
                });
            }
        }
        if global.space != naga::AddressSpace::Uniform {
            continue;
        }
        if let naga::TypeInner::Struct { members, .. } = &module.types[global.ty].inner {
            for member in members {
                if member.name.as_deref() == Some(name) {
                    return Some(Location::Uniform {
                        offset: member.offset,
                        size: module.types[member.ty].inner.size(module.to_ctx()),
                    });
                }
            }
        }
    }
    None
}

fn uniform_block_size(module: &naga::Module) -> u32 {
    module
        .global_variables
        .iter()
        .filter(|(_, global)| global.space == naga::AddressSpace::Uniform)
        .map(|(_, global)| module.types[global.ty].inner.size(module.to_ctx()))
        .max()
        .unwrap_or(0)
}

const FLAT_VERTEX: &str = r#"#version 450
layout(location = 0) in vec3 vPosition;

layout(set = 0, binding = 0) uniform FlatParams {
    mat4 uMVPMatrix;
    vec4 uColor;
};

void main() {
    gl_Position = uMVPMatrix * vec4(vPosition, 1.0);
}
"#;

const FLAT_FRAGMENT: &str = r#"#version 450
layout(location = 0) out vec4 fragColor;

layout(set = 0, binding = 0) uniform FlatParams {
    mat4 uMVPMatrix;
    vec4 uColor;
};

void main() {
    fragColor = uColor;
}
"#;

const TEXTURED_VERTEX: &str = r#"#version 450
layout(location = 0) in vec3 vPosition;
layout(location = 1) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;

layout(set = 0, binding = 0) uniform TextureParams {
    mat4 uMVPMatrix;
};

void main() {
    vTexCoord = aTexCoord;
    gl_Position = uMVPMatrix * vec4(vPosition, 1.0);
}
"#;

const TEXTURE_FRAGMENT: &str = r#"#version 450
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 fragColor;

layout(set = 1, binding = 0) uniform texture2D uTexture;
layout(set = 1, binding = 1) uniform sampler uSampler;

void main() {
    fragColor = texture(sampler2D(uTexture, uSampler), vTexCoord);
}
"#;

const VIDEO_VERTEX: &str = TEXTURED_VERTEX;

const VIDEO_FRAGMENT: &str = r#"#version 450
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 fragColor;

layout(set = 1, binding = 0) uniform texture2D uTexture;
layout(set = 1, binding = 1) uniform sampler uSampler;

void main() {
    vec4 frame = texture(sampler2D(uTexture, uSampler), vTexCoord);
    fragColor = vec4(frame.rgb, 1.0);
}
"#;

const TICKER_VERTEX: &str = r#"#version 450
layout(location = 0) in vec3 vPosition;
layout(location = 1) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;

layout(set = 0, binding = 0) uniform TickerParams {
    mat4 uMVPMatrix;
    float uOffset;
    float uSmoothFactor;
    float uRepeat;
};

void main() {
    vTexCoord = aTexCoord;
    gl_Position = uMVPMatrix * vec4(vPosition, 1.0);
}
"#;

const TICKER_FRAGMENT: &str = r#"#version 450
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 fragColor;

layout(set = 0, binding = 0) uniform TickerParams {
    mat4 uMVPMatrix;
    float uOffset;
    float uSmoothFactor;
    float uRepeat;
};

layout(set = 1, binding = 0) uniform texture2D uTexture;
layout(set = 1, binding = 1) uniform sampler uSampler;

void main() {
    vec2 uv = vec2(vTexCoord.x * uRepeat + uOffset, vTexCoord.y);
    vec4 color = texture(sampler2D(uTexture, uSampler), uv);
    float feather = max(uSmoothFactor * 0.05, 0.0001);
    float edge = smoothstep(0.0, feather, vTexCoord.x)
        * smoothstep(0.0, feather, 1.0 - vTexCoord.x);
    fragColor = vec4(color.rgb, color.a * edge);
}
"#;

const CROSSFADE_VERTEX: &str = r#"#version 450
layout(location = 0) in vec3 vPosition;
layout(location = 1) in vec2 aTexCoord;
layout(location = 0) out vec2 vTexCoord;

layout(set = 0, binding = 0) uniform CrossfadeParams {
    mat4 uMVPMatrix;
    float uProgress;
};

void main() {
    vTexCoord = aTexCoord;
    gl_Position = uMVPMatrix * vec4(vPosition, 1.0);
}
"#;

const CROSSFADE_FRAGMENT: &str = r#"#version 450
layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 fragColor;

layout(set = 0, binding = 0) uniform CrossfadeParams {
    mat4 uMVPMatrix;
    float uProgress;
};

layout(set = 1, binding = 0) uniform texture2D uTexture;
layout(set = 1, binding = 1) uniform texture2D uTexture2;
layout(set = 1, binding = 2) uniform sampler uSampler;

void main() {
    vec4 from = texture(sampler2D(uTexture, uSampler), vTexCoord);
    vec4 to = texture(sampler2D(uTexture2, uSampler), vTexCoord);
    fragColor = mix(from, to, clamp(uProgress, 0.0, 1.0));
}
"#;
