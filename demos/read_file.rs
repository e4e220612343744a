//! Example: open a cube file and print its root variable
//!
//! Run with: cargo run --example read_file -- path/to/file.om

use cubefile::utils::format_bytes;
use cubefile::{FileBackend, Reader};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: read_file <path to cube file>")?;

    let reader = Reader::open(FileBackend::open(&path)?)?;
    let variable = reader.variable();

    println!("Cube file: {}", path);
    println!("==========");
    println!("Size:        {}", format_bytes(reader.total_size()));
    println!("Layout:      {:?}", reader.header_kind());
    println!("Name:        {}", variable.name().unwrap_or("(unnamed)"));
    println!("Data type:   {}", variable.data_type());
    println!("Compression: {:?}", variable.compression());
    println!("Scale:       {}", variable.scale_factor());
    println!("Offset:      {}", variable.add_offset());
    println!("Dimensions:  {:?}", variable.dimensions().to_vec());
    println!("Chunks:      {:?}", variable.chunks().to_vec());
    println!("Chunk count: {}", variable.number_of_chunks());
    println!(
        "Chunk index: {} at offset {}",
        format_bytes(variable.lut_size()),
        variable.lut_offset()
    );

    if variable.number_of_children() > 0 {
        println!();
        println!("Children:");
        for (i, child) in variable.children().enumerate() {
            println!(
                "  {}: {} at offset {}",
                i,
                format_bytes(child.size),
                child.offset
            );
        }
    }

    Ok(())
}
