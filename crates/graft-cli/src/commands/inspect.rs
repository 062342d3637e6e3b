//! Inspect command implementation.

use anyhow::Result;
use clap::ValueEnum;

use crate::commands::parse_hex_address;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RecordKind {
    MethodTable,
    FieldDesc,
    MethodDesc,
}

/// Run the inspect command
#[cfg(target_os = "windows")]
pub fn run(kind: RecordKind, address: &str) -> Result<()> {
    use graft_core::{
        FieldDescView, MethodDescView, MethodTableView, ProcessMemory,
    };

    let address = parse_hex_address(address)?;
    let memory = ProcessMemory::new();

    match kind {
        RecordKind::MethodTable => {
            let view = MethodTableView::new(&memory, address);
            println!("Method table at {:#x}", address);
            println!("  flags:          {:#010x}", view.flags()?);
            println!("  base size:      {}", view.base_size()?);
            if let Some(component) = view.component_size()? {
                println!("  component size: {}", component);
            }
            println!("  token:          {:#06x}", view.token()?);
            println!("  virtuals:       {}", view.num_virtuals()?);
            println!("  interfaces:     {}", view.num_interfaces()?);
            println!("  parent:         {:#x}", view.parent()?);
            println!("  loader module:  {:#x}", view.loader_module()?);
            println!("  class info:     {:?}", view.class_info()?);
            if let Some(handle) = view.element_type_handle()? {
                println!("  element handle: {:#x}", handle);
            }
        }
        RecordKind::FieldDesc => {
            let view = FieldDescView::new(&memory, address);
            println!("Field descriptor at {:#x}", address);
            println!("  enclosing type: {:#x}", view.enclosing_type()?);
            println!("  offset:         {:#x}", view.offset()?);
            println!("  element type:   {}", view.element_type()?);
            println!("  protection:     {}", view.protection()?);
            println!("  static:         {}", view.is_static()?);
            println!("  thread-local:   {}", view.is_thread_local()?);
            println!("  rva:            {}", view.is_rva()?);
            if !view.requires_full_token()? {
                println!("  token:          {:#010x}", view.token()?);
            }
        }
        RecordKind::MethodDesc => {
            let view = MethodDescView::new(&memory, address);
            println!("Method descriptor at {:#x}", address);
            println!("  classification: {}", view.classification()?);
            println!("  slot:           {}", view.slot_number()?);
            println!("  chunk index:    {}", view.chunk_index()?);
            println!("  static:         {}", view.is_static()?);
            println!("  stable entry:   {}", view.has_stable_entry_point()?);
            println!("  precode:        {}", view.has_precode()?);
            println!("  function ptr:   {:#x}", view.function_pointer()?);
        }
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn run(_kind: RecordKind, address: &str) -> Result<()> {
    let _ = parse_hex_address(address)?;
    anyhow::bail!("inspecting live records is only supported on Windows")
}
