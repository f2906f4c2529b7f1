use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rustc-check-cfg=cfg(llama_ffi)");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LLAMA_CPP_DIR");
    println!("cargo:rerun-if-env-changed=LLAMA_CPP_LIB");

    let roots = source_roots();
    let Some(header) = roots.iter().find_map(|r| find_header(r)) else {
        println!("cargo:warning=llama.cpp not found (set LLAMA_CPP_DIR); textgen will only run with --mock");
        return;
    };

    emit_link_search(&roots);
    emit_link_libs();
    generate_bindings(&header, &roots);
    println!("cargo:rustc-cfg=llama_ffi");
}

fn canon(p: &Path) -> PathBuf {
    std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}

/// `LLAMA_CPP_DIR` first, then a checkout under `third_party/`.
fn source_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(dir) = std::env::var("LLAMA_CPP_DIR") {
        roots.push(canon(Path::new(&dir)));
    }
    let vendored = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../third_party/llama.cpp");
    if vendored.exists() {
        roots.push(canon(&vendored));
    }
    roots
}

fn find_header(root: &Path) -> Option<PathBuf> {
    [root.join("include/llama.h"), root.join("llama.h")].into_iter().find(|h| h.exists())
}

fn emit_link_search(roots: &[PathBuf]) {
    if let Ok(extra) = std::env::var("LLAMA_CPP_LIB") {
        for p in extra.split(|c| c == ';' || c == ':').filter(|s| !s.is_empty()) {
            println!("cargo:rustc-link-search=native={}", canon(Path::new(p)).display());
        }
    }
    for root in roots {
        for sub in ["build/src", "build/ggml/src", "build/src/Release", "build/ggml/src/Release", "build"] {
            let p = root.join(sub);
            if p.exists() {
                println!("cargo:rustc-link-search=native={}", canon(&p).display());
            }
        }
    }
}

fn emit_link_libs() {
    let target = std::env::var("TARGET").unwrap_or_default();
    println!("cargo:rustc-link-lib=static=llama");
    println!("cargo:rustc-link-lib=static=ggml");
    if target.contains("apple-darwin") {
        println!("cargo:rustc-link-lib=c++");
    } else if !target.contains("windows") {
        for lib in ["stdc++", "m", "dl", "pthread"] {
            println!("cargo:rustc-link-lib={}", lib);
        }
    }
}

fn generate_bindings(header: &Path, roots: &[PathBuf]) {
    let mut builder = bindgen::Builder::default()
        .header(header.to_string_lossy())
        .allowlist_function("llama_.*")
        .allowlist_type("llama_.*")
        .allowlist_var("LLAMA_.*");
    for root in roots {
        for inc in [root.clone(), root.join("include"), root.join("ggml/include")] {
            builder = builder.clang_arg(format!("-I{}", inc.display()));
        }
    }
    let bindings = builder.generate().expect("bindgen failed for llama.h");
    let out = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR")).join("llama_bindings.rs");
    bindings.write_to_file(out).expect("write llama bindings");
    println!("cargo:rerun-if-changed={}", header.display());
}
