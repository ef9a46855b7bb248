//! Check command implementation.
//!
//! Validates that the counter files cpuproc depends on are readable.

use cpuproc::config::validate_effective_config;
use cpuproc::fsutil::path_exists;
use cpuproc::ProcessHandle;

use crate::state::AppState;

/// Validates system requirements and configuration
pub fn command_check(state: &AppState) -> anyhow::Result<()> {
    println!("🔍 cpuproc - System Check");
    println!("=========================");

    let mut all_ok = true;
    let paths = state.host.paths();

    println!("\n📁 Checking proc filesystem...");
    let proc_root = paths.proc(&[]);
    if path_exists(&proc_root) {
        println!("   ✅ {} accessible", proc_root.display());
    } else {
        println!("   ❌ {} not found", proc_root.display());
        all_ok = false;
    }

    println!("\n🧮 Checking CPU counters...");
    let total = state.engine.times(false);
    let per_cpu = state.engine.times(true);
    if total.is_empty() {
        println!("   ❌ Cannot read aggregate counters from {}", paths.proc(&["stat"]).display());
        all_ok = false;
    } else {
        println!("   ✅ Aggregate counters readable ({} cores)", per_cpu.len());
    }

    println!("\n⚙️  Checking process sampling...");
    let pid = std::process::id() as i32;
    match ProcessHandle::new(pid, state.sampler.clone()).and_then(|h| {
        let allowed = h.allowed_cpus();
        h.stat().map(|s| (s, allowed))
    }) {
        Ok((stat, allowed)) => println!(
            "   ✅ Self stat readable: {} (pid {}), {} allowed cores",
            stat.name, stat.pid, allowed
        ),
        Err(e) => {
            println!("   ❌ Self stat failed: {}", e);
            all_ok = false;
        }
    }

    println!("\n⏱️  Checking boot time...");
    match state.host.boot_time(false) {
        Ok(t) => println!("   ✅ Boot time: {}", t),
        Err(e) => {
            println!("   ⚠️  Boot time unavailable: {}", e);
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(&state.config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
