//! Pipeline-state cache.
//!
//! Fixed-function native state objects are deduplicated by structural
//! equality of their descriptions and shared by every pipeline that asks for
//! them. Any differing field, including the blend factor and the stencil
//! reference, yields a distinct object. Entries live until the device is
//! disposed.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::backend::{
    GpuBackend, NativeBlendState, NativeDepthStencilState, NativeInputLayout, NativeObject,
    NativeRasterizerState,
};
use crate::error::GraphicsResult;
use crate::types::{
    BlendStateDescription, DepthStencilStateDescription, RasterizerStateDescription,
    VertexLayoutDescription,
};

/// Get-or-insert map from a description to a native handle.
#[derive(Debug)]
pub struct StateCache<K, V> {
    entries: HashMap<K, V>,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V: Copy> StateCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached value for `key`, creating it on a miss.
    ///
    /// A failed `create` leaves the cache unchanged.
    pub fn get_or_insert_with(
        &mut self,
        key: &K,
        create: impl FnOnce() -> GraphicsResult<V>,
    ) -> GraphicsResult<V> {
        if let Some(value) = self.entries.get(key) {
            self.hits += 1;
            return Ok(*value);
        }
        let value = create()?;
        self.misses += 1;
        self.entries.insert(key.clone(), value);
        Ok(value)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that created an entry.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Remove every entry, yielding the values.
    pub fn drain(&mut self) -> impl Iterator<Item = V> + '_ {
        self.entries.drain().map(|(_, value)| value)
    }
}

impl<K: Eq + Hash + Clone, V: Copy> Default for StateCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Native state objects for one graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStateObjects {
    /// Blend state.
    pub blend: NativeBlendState,
    /// Depth/stencil state.
    pub depth_stencil: NativeDepthStencilState,
    /// Rasterizer state.
    pub rasterizer: NativeRasterizerState,
    /// Input layout, absent when the pipeline has no vertex layouts.
    pub input_layout: Option<NativeInputLayout>,
}

/// Entry counts and lookup statistics of a [`PipelineStateCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Cached blend states.
    pub blend_states: usize,
    /// Cached depth/stencil states.
    pub depth_stencil_states: usize,
    /// Cached rasterizer states.
    pub rasterizer_states: usize,
    /// Cached input layouts.
    pub input_layouts: usize,
    /// Lookups answered from the cache, all kinds.
    pub hits: u64,
    /// Lookups that created an object, all kinds.
    pub misses: u64,
}

impl CacheStats {
    /// Total cached objects.
    pub fn total_entries(&self) -> usize {
        self.blend_states + self.depth_stencil_states + self.rasterizer_states + self.input_layouts
    }
}

type InputLayoutKey = (Vec<VertexLayoutDescription>, Vec<u8>);

#[derive(Debug, Default)]
struct Caches {
    blend: StateCache<BlendStateDescription, NativeBlendState>,
    depth_stencil: StateCache<DepthStencilStateDescription, NativeDepthStencilState>,
    rasterizer: StateCache<(RasterizerStateDescription, bool), NativeRasterizerState>,
    input_layout: StateCache<InputLayoutKey, NativeInputLayout>,
}

/// Device-owned cache of fixed-function state objects.
#[derive(Debug, Default)]
pub struct PipelineStateCache {
    caches: Mutex<Caches>,
}

impl PipelineStateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the state objects of a graphics pipeline.
    ///
    /// `multisampled` is part of the rasterizer key. The input layout key
    /// includes the vertex shader bytecode, which the layout is validated
    /// against.
    pub fn get_or_create(
        &self,
        backend: &dyn GpuBackend,
        blend: &BlendStateDescription,
        depth_stencil: &DepthStencilStateDescription,
        rasterizer: &RasterizerStateDescription,
        multisampled: bool,
        vertex_layouts: &[VertexLayoutDescription],
        vertex_shader_bytecode: &[u8],
    ) -> GraphicsResult<PipelineStateObjects> {
        let mut caches = self.caches.lock();

        let blend = caches.blend.get_or_insert_with(blend, || {
            log::debug!("PipelineStateCache: creating blend state");
            backend.create_blend_state(blend)
        })?;

        let depth_stencil = caches.depth_stencil.get_or_insert_with(depth_stencil, || {
            log::debug!("PipelineStateCache: creating depth/stencil state");
            backend.create_depth_stencil_state(depth_stencil)
        })?;

        let rasterizer = caches
            .rasterizer
            .get_or_insert_with(&(*rasterizer, multisampled), || {
                log::debug!(
                    "PipelineStateCache: creating rasterizer state (multisampled: {multisampled})"
                );
                backend.create_rasterizer_state(rasterizer, multisampled)
            })?;

        let input_layout = if vertex_layouts.is_empty() {
            None
        } else {
            let key = (vertex_layouts.to_vec(), vertex_shader_bytecode.to_vec());
            Some(caches.input_layout.get_or_insert_with(&key, || {
                log::debug!(
                    "PipelineStateCache: creating input layout for {} vertex buffers",
                    vertex_layouts.len()
                );
                backend.create_input_layout(vertex_layouts, vertex_shader_bytecode)
            })?)
        };

        Ok(PipelineStateObjects {
            blend,
            depth_stencil,
            rasterizer,
            input_layout,
        })
    }

    /// Entry counts and hit/miss totals.
    pub fn stats(&self) -> CacheStats {
        let caches = self.caches.lock();
        CacheStats {
            blend_states: caches.blend.len(),
            depth_stencil_states: caches.depth_stencil.len(),
            rasterizer_states: caches.rasterizer.len(),
            input_layouts: caches.input_layout.len(),
            hits: caches.blend.hits()
                + caches.depth_stencil.hits()
                + caches.rasterizer.hits()
                + caches.input_layout.hits(),
            misses: caches.blend.misses()
                + caches.depth_stencil.misses()
                + caches.rasterizer.misses()
                + caches.input_layout.misses(),
        }
    }

    /// Destroy every cached object. Called when the device is disposed.
    pub(crate) fn destroy_all(&self, backend: &dyn GpuBackend) {
        let mut caches = self.caches.lock();
        for state in caches.blend.drain() {
            backend.destroy(NativeObject::BlendState(state));
        }
        for state in caches.depth_stencil.drain() {
            backend.destroy(NativeObject::DepthStencilState(state));
        }
        for state in caches.rasterizer.drain() {
            backend.destroy(NativeObject::RasterizerState(state));
        }
        for layout in caches.input_layout.drain() {
            backend.destroy(NativeObject::InputLayout(layout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{
        PolygonFillMode, RgbaFloat, VertexElementDescription, VertexElementFormat,
    };

    fn layouts() -> Vec<VertexLayoutDescription> {
        vec![VertexLayoutDescription::new(vec![VertexElementDescription::new(
            "Position",
            VertexElementFormat::Float3,
        )])]
    }

    #[test]
    fn test_state_cache_counts_hits() {
        let mut cache: StateCache<u32, u64> = StateCache::new();
        assert_eq!(cache.get_or_insert_with(&1, || Ok(10)), Ok(10));
        assert_eq!(cache.get_or_insert_with(&1, || Ok(20)), Ok(10));
        assert_eq!((cache.hits(), cache.misses(), cache.len()), (1, 1, 1));
    }

    #[test]
    fn test_failed_create_is_not_cached() {
        let mut cache: StateCache<u32, u64> = StateCache::new();
        let err = cache.get_or_insert_with(&1, || Err(crate::GraphicsError::OutOfMemory));
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_identical_descriptions_share_objects() {
        let backend = DummyBackend::new();
        let cache = PipelineStateCache::new();
        let blend = BlendStateDescription::single_override();
        let depth = DepthStencilStateDescription::default();
        let raster = RasterizerStateDescription::default();

        let a = cache
            .get_or_create(&backend, &blend, &depth, &raster, false, &layouts(), b"vs")
            .unwrap();
        let b = cache
            .get_or_create(&backend, &blend, &depth, &raster, false, &layouts(), b"vs")
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.stats().total_entries(), 4);
    }

    #[test]
    fn test_fill_mode_only_changes_rasterizer() {
        let backend = DummyBackend::new();
        let cache = PipelineStateCache::new();
        let blend = BlendStateDescription::single_override();
        let depth = DepthStencilStateDescription::default();
        let solid = RasterizerStateDescription::default();
        let wireframe = RasterizerStateDescription {
            fill_mode: PolygonFillMode::Wireframe,
            ..solid
        };

        let a = cache
            .get_or_create(&backend, &blend, &depth, &solid, false, &layouts(), b"vs")
            .unwrap();
        let b = cache
            .get_or_create(&backend, &blend, &depth, &wireframe, false, &layouts(), b"vs")
            .unwrap();
        assert_eq!(a.blend, b.blend);
        assert_eq!(a.depth_stencil, b.depth_stencil);
        assert_eq!(a.input_layout, b.input_layout);
        assert_ne!(a.rasterizer, b.rasterizer);
    }

    #[test]
    fn test_blend_factor_and_stencil_reference_split_entries() {
        let backend = DummyBackend::new();
        let cache = PipelineStateCache::new();
        let raster = RasterizerStateDescription::default();
        let blend_a = BlendStateDescription::single_alpha_blend();
        let blend_b = BlendStateDescription {
            blend_factor: RgbaFloat::WHITE,
            ..blend_a.clone()
        };
        let depth_a = DepthStencilStateDescription::default();
        let depth_b = DepthStencilStateDescription {
            stencil_reference: 3,
            ..depth_a
        };

        let a = cache
            .get_or_create(&backend, &blend_a, &depth_a, &raster, false, &[], b"")
            .unwrap();
        let b = cache
            .get_or_create(&backend, &blend_b, &depth_b, &raster, false, &[], b"")
            .unwrap();
        assert_ne!(a.blend, b.blend);
        assert_ne!(a.depth_stencil, b.depth_stencil);
        assert_eq!(a.rasterizer, b.rasterizer);
        assert_eq!(a.input_layout, None);
        assert_eq!(cache.stats().blend_states, 2);
        assert_eq!(cache.stats().depth_stencil_states, 2);
    }

    #[test]
    fn test_multisample_flag_and_bytecode_are_keys() {
        let backend = DummyBackend::new();
        let cache = PipelineStateCache::new();
        let blend = BlendStateDescription::single_override();
        let depth = DepthStencilStateDescription::default();
        let raster = RasterizerStateDescription::default();

        let a = cache
            .get_or_create(&backend, &blend, &depth, &raster, false, &layouts(), b"vs1")
            .unwrap();
        let b = cache
            .get_or_create(&backend, &blend, &depth, &raster, true, &layouts(), b"vs2")
            .unwrap();
        assert_ne!(a.rasterizer, b.rasterizer);
        assert_ne!(a.input_layout, b.input_layout);
    }
}
