//! Staging upload round trips on a real device.

use prism_gpu::{vk, GpuContextBuilder, ImageUpload, TransferPipeline, Visibility};
use std::sync::Arc;

fn pipeline() -> (Arc<prism_gpu::GpuContext>, TransferPipeline) {
    let gpu = Arc::new(
        GpuContextBuilder::new()
            .app_name("prism-gpu-tests")
            .validation(false)
            .build()
            .expect("Vulkan device"),
    );
    let transfer = TransferPipeline::new(gpu.clone()).expect("transfer pipeline");
    (gpu, transfer)
}

#[test]
#[ignore = "requires a Vulkan device"]
fn staged_buffer_reads_back_identical() {
    let (_gpu, transfer) = pipeline();

    let payload: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
    let buffer = transfer
        .upload_buffer(
            &payload,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            "roundtrip",
        )
        .unwrap();

    assert_eq!(transfer.read_back(&buffer).unwrap(), payload);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn staged_upload_into_host_visible_destination() {
    let (_gpu, transfer) = pipeline();

    let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
    let bytes = bytemuck::cast_slice(&indices);
    let buffer = transfer
        .upload_buffer_to(
            bytes,
            vk::BufferUsageFlags::INDEX_BUFFER,
            Visibility::HostReadback,
            "host-visible",
        )
        .unwrap();

    assert_eq!(buffer.read_bytes().unwrap(), bytes);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn mipmapped_texture_upload() {
    let (_gpu, transfer) = pipeline();

    let texels = vec![255u8; 64 * 32 * 4];
    let image = transfer
        .upload_image(
            &ImageUpload {
                texels: &texels,
                width: 64,
                height: 32,
                format: vk::Format::R8G8B8A8_SRGB,
                mipmapped: true,
            },
            "checker",
        )
        .unwrap();

    assert_eq!(image.mip_levels(), 7);
}
