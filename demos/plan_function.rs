use anyhow::Result;
use memplan::{export_plan_json, MemoryManager, PlanReport};

fn main() -> Result<()> {
    let manager = MemoryManager::new();

    // Emit an outer kernel with a nested inner kernel, the way a depth-first
    // code generator walks the operation graph.
    let mut outer = manager.build_allocator();
    let weights: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let weights_offset = outer.reserve_argspace_typed(&weights)?;
    let outer_scratch = outer.reserve_workspace(1024, true)?;

    {
        let mut inner = manager.build_allocator();
        let inner_scratch = inner.reserve_workspace(256, false)?;
        println!("inner scratch at workspace offset {}", inner_scratch);
        inner.close()?;
    }

    // A sibling kernel reuses the inner kernel's freed range.
    {
        let mut sibling = manager.build_allocator();
        let sibling_scratch = sibling.reserve_workspace(200, true)?;
        println!("sibling scratch at workspace offset {}", sibling_scratch);
        sibling.close()?;
    }

    outer.close()?;
    manager.allocate()?;

    println!("weights staged at argspace offset {}", weights_offset);
    println!("outer scratch at workspace offset {}", outer_scratch);
    println!(
        "device buffer: {} bytes total ({} argspace + {} workspace at base {})",
        manager.get_allocation_size()?,
        manager.argspace_size()?,
        manager.workspace_size()?,
        manager.workspace_base_offset()?,
    );

    let report = PlanReport::from_manager(&manager)?;
    let json = export_plan_json(&report)?;
    println!("{}", String::from_utf8_lossy(&json));
    Ok(())
}
