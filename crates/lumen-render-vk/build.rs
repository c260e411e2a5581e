use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    // No vertex input: corners and colors are indexed by gl_VertexIndex.
    let vs_src = r#"
#version 450
layout(location = 0) out vec3 vColor;

const vec2 POSITIONS[3] = vec2[](
    vec2( 0.0, -0.6),
    vec2( 0.5,  0.4),
    vec2(-0.5,  0.4)
);

const vec3 COLORS[3] = vec3[](
    vec3(1.0, 0.0, 0.0),
    vec3(0.0, 1.0, 0.0),
    vec3(0.0, 0.0, 1.0)
);

void main() {
    vColor = COLORS[gl_VertexIndex];
    gl_Position = vec4(POSITIONS[gl_VertexIndex], 0.0, 1.0);
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "tri.vert",
            "main",
            Some(&opts),
        )
        .expect("compile tri.vert");
    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "tri.frag",
            "main",
            Some(&opts),
        )
        .expect("compile tri.frag");

    fs::write(out.join("tri.vert.spv"), vs_spv.as_binary_u8()).expect("write tri.vert.spv");
    fs::write(out.join("tri.frag.spv"), fs_spv.as_binary_u8()).expect("write tri.frag.spv");

    println!("cargo:rerun-if-changed=build.rs");
}
