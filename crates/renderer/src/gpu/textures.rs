use std::collections::HashMap;

use crate::texture::{GpuResources, TextureDesc, TextureHandle, TextureWrap};

pub(crate) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub desc: TextureDesc,
}

/// wgpu-backed texture store addressed by [`TextureHandle`].
pub(crate) struct TextureRegistry {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: HashMap<TextureHandle, GpuTexture>,
    next: u32,
    max_dimension: u32,
    clamp_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
}

impl TextureRegistry {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, max_dimension: u32) -> Self {
        let clamp_sampler = create_sampler(device, "clamp sampler", wgpu::AddressMode::ClampToEdge);
        let repeat_sampler = create_sampler(device, "repeat-x sampler", wgpu::AddressMode::Repeat);
        Self {
            device: device.clone(),
            queue: queue.clone(),
            textures: HashMap::new(),
            next: 0,
            max_dimension,
            clamp_sampler,
            repeat_sampler,
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(&handle)
    }

    pub fn sampler_for(&self, handle: TextureHandle) -> &wgpu::Sampler {
        match self.textures.get(&handle).map(|texture| texture.desc.wrap) {
            Some(TextureWrap::RepeatX) => &self.repeat_sampler,
            _ => &self.clamp_sampler,
        }
    }

    pub fn live(&self) -> usize {
        self.textures.len()
    }

    fn upload(&self, texture: &wgpu::Texture, desc: &TextureDesc, pixels: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            extent(desc),
        );
    }
}

impl GpuResources for TextureRegistry {
    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Option<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            tracing::warn!(slot = ?desc.slot, "refusing to create an empty texture");
            return None;
        }
        if desc.width > self.max_dimension || desc.height > self.max_dimension {
            tracing::warn!(
                slot = ?desc.slot,
                width = desc.width,
                height = desc.height,
                max = self.max_dimension,
                "texture exceeds device limit"
            );
            return None;
        }
        if pixels.is_some_and(|pixels| pixels.len() != desc.byte_len()) {
            tracing::warn!(slot = ?desc.slot, "pixel data does not match texture size");
            return None;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("zone texture"),
            size: extent(desc),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(pixels) = pixels {
            self.upload(&texture, desc, pixels);
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.next = self.next.checked_add(1)?;
        let handle = TextureHandle::from_raw(self.next)?;
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                desc: *desc,
            },
        );
        Some(handle)
    }

    fn write_texture(&mut self, handle: TextureHandle, pixels: &[u8]) -> bool {
        let Some(entry) = self.textures.get(&handle) else {
            return false;
        };
        if pixels.len() != entry.desc.byte_len() {
            return false;
        }
        self.upload(&entry.texture, &entry.desc, pixels);
        true
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.textures.remove(&handle) {
            entry.texture.destroy();
        }
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }
}

fn extent(desc: &TextureDesc) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: 1,
    }
}

fn create_sampler(device: &wgpu::Device, label: &str, address_mode_u: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
