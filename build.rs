//! Build script for khyp
//!
//! Bare-metal ARMv7 builds get a linker script placing the hypervisor at
//! its load address. Hosted builds need nothing.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TARGET");

    let target = env::var("TARGET").unwrap_or_default();
    if !target.contains("-none") {
        return;
    }

    if !target.starts_with("arm") && !target.starts_with("thumb") {
        println!(
            "cargo:warning=khyp: no linker script for {}, only ARMv7 is supported",
            target
        );
        return;
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let script = generate_armv7_linker_script(&out_dir);

    println!("cargo:rustc-link-arg-bins=-T{}", script.display());
    println!("cargo:rustc-link-arg-bins=--gc-sections");
}

fn generate_armv7_linker_script(out_dir: &str) -> PathBuf {
    let script = r#"
/* ARMv7 hyp-mode linker script for khyp */
ENTRY(hyp_main)

MEMORY {
    RAM (rwx) : ORIGIN = 0xF0000000, LENGTH = 64M
}

SECTIONS {
    .text : {
        KEEP(*(.text.entry))
        *(.text .text.*)
        *(.rodata .rodata.*)
    } > RAM

    .data : ALIGN(4096) {
        __data_start = .;
        *(.data .data.*)
        __data_end = .;
    } > RAM

    .bss : ALIGN(4096) {
        __bss_start = .;
        *(.bss .bss.*)
        *(COMMON)
        __bss_end = .;
    } > RAM

    /* Hyp stack, grows down from __stack_end */
    .stack : ALIGN(4096) {
        __stack_start = .;
        . = . + 64 * 1024;
        __stack_end = .;
    } > RAM

    /DISCARD/ : {
        *(.ARM.exidx*)
        *(.comment)
        *(.note*)
    }
}
"#;

    let path = Path::new(out_dir).join("link-armv7.ld");
    fs::write(&path, script).expect("failed to write linker script");
    path
}
