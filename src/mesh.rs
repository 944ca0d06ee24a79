// =============================================================================
// MESH - The one textured quad
// =============================================================================

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

use crate::backend::{GpuBuffer, GraphicsDevice};

/// Interleaved position + texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position: Vec3::from_array(position),
            uv: Vec2::from_array(uv),
        }
    }
}

/// Full-screen quad in clip space, uv origin top-left
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0]),  // upper left
    Vertex::new([1.0, 1.0, 0.0], [1.0, 0.0]),   // upper right
    Vertex::new([1.0, -1.0, 0.0], [1.0, 1.0]),  // bottom right
    Vertex::new([-1.0, -1.0, 0.0], [0.0, 1.0]), // bottom left
];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Binding 0 carries `Vertex`; location 0 = position, location 1 = uv
pub fn vertex_input_descriptions() -> (
    [vk::VertexInputBindingDescription; 1],
    [vk::VertexInputAttributeDescription; 2],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };

    let position = vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: offset_of!(Vertex, position) as u32,
    };

    let uv = vk::VertexInputAttributeDescription {
        location: 1,
        binding: 0,
        format: vk::Format::R32G32_SFLOAT,
        offset: offset_of!(Vertex, uv) as u32,
    };

    ([binding], [position, uv])
}

/// Vertex and index buffers for an indexed draw
#[derive(Default)]
pub struct Mesh {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
}

impl Mesh {
    pub fn quad(device: &GraphicsDevice) -> Result<Self> {
        let mut vertex_buffer = GpuBuffer::with_data(
            device,
            "quad vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &QUAD_VERTICES,
        )?;
        let index_buffer = match GpuBuffer::with_data(
            device,
            "quad indices",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &QUAD_INDICES,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy(device);
                return Err(e);
            }
        };

        log::info!(
            "Quad mesh uploaded ({} vertices, {} indices)",
            QUAD_VERTICES.len(),
            QUAD_INDICES.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    pub fn destroy(&mut self, device: &GraphicsDevice) {
        self.vertex_buffer.destroy(device);
        self.index_buffer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 5 * size_of::<f32>());

        let (bindings, attributes) = vertex_input_descriptions();
        assert_eq!(bindings[0].stride, 20);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn indices_form_two_triangles_over_all_corners() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        for corner in 0..QUAD_VERTICES.len() as u32 {
            assert!(QUAD_INDICES.contains(&corner));
        }
    }

    #[test]
    fn uv_covers_unit_square() {
        let uvs: Vec<Vec2> = QUAD_VERTICES.iter().map(|v| v.uv).collect();
        assert!(uvs.contains(&Vec2::new(0.0, 0.0)));
        assert!(uvs.contains(&Vec2::new(1.0, 1.0)));
        assert!(QUAD_VERTICES
            .iter()
            .all(|v| v.position.x.abs() == 1.0 && v.position.y.abs() == 1.0));
    }

    #[test]
    fn vertices_cast_to_bytes() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 80);
    }
}
