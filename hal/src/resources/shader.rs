//! Compiled shader stage.

use super::{DeviceResource, ResourceCore, ResourceId};
use crate::backend::{NativeObject, NativeShader};
use crate::error::GraphicsResult;
use crate::types::{ShaderDescriptor, ShaderStages};

/// A compiled shader for one stage.
///
/// The bytecode is opaque to the layer. It is kept alongside the native
/// shader because vertex input layouts are validated against it.
pub struct Shader {
    core: ResourceCore,
    descriptor: ShaderDescriptor,
    native: NativeShader,
}

impl Shader {
    pub(crate) fn new(core: ResourceCore, descriptor: ShaderDescriptor, native: NativeShader) -> Self {
        Self {
            core,
            descriptor,
            native,
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> ResourceId {
        self.core.id()
    }

    /// Stage this shader runs in.
    pub fn stage(&self) -> ShaderStages {
        self.descriptor.stage
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &str {
        &self.descriptor.entry_point
    }

    /// Compiled bytecode.
    pub fn bytecode(&self) -> &[u8] {
        &self.descriptor.bytecode
    }

    /// Get the shader label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the native shader. Pipelines created from it keep working.
    pub fn dispose(&self) {
        if self.core.mark_disposed() {
            self.core.backend().destroy(NativeObject::Shader(self.native));
        }
    }

    pub(crate) fn native(&self) -> GraphicsResult<NativeShader> {
        self.core.check("shader", self.label())?;
        Ok(self.native)
    }
}

impl DeviceResource for Shader {
    fn dispose(&self) {
        Shader::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Shader::is_disposed(self)
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id())
            .field("stage", &self.descriptor.stage)
            .field("entry_point", &self.descriptor.entry_point)
            .field("bytecode_len", &self.descriptor.bytecode.len())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
