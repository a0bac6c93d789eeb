/// Installer components that may be requested on top of the default set.
const OPTIONAL_COMPONENTS: [&str; 11] = [
    "com.lunarg.vulkan.32bit",
    "com.lunarg.vulkan.sdl2",
    "com.lunarg.vulkan.glm",
    "com.lunarg.vulkan.volk",
    "com.lunarg.vulkan.vma",
    "com.lunarg.vulkan.debug",
    "com.lunarg.vulkan.debug32",
    "com.lunarg.vulkan.arm64",
    "com.lunarg.vulkan.core",
    "com.lunarg.vulkan.usr",
    "com.lunarg.vulkan.ios",
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ComponentSelection {
    pub(crate) valid: Vec<String>,
    pub(crate) invalid: Vec<String>,
}

pub(crate) fn filter_components(requested: &[String]) -> ComponentSelection {
    let mut selection = ComponentSelection::default();
    for component in requested {
        let component = component.trim();
        if component.is_empty() {
            continue;
        }
        let bucket = if OPTIONAL_COMPONENTS.contains(&component) {
            &mut selection.valid
        } else {
            &mut selection.invalid
        };
        if !bucket.iter().any(|c| c == component) {
            bucket.push(component.to_string());
        }
    }
    selection
}

pub(crate) fn supported_components_csv() -> String {
    OPTIONAL_COMPONENTS.join(", ")
}
