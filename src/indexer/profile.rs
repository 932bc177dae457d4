//! Project-level build profile from Gradle scripts and the app manifest

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const DI_LIBRARIES: &[(&str, &[&str])] = &[
    ("dagger", &["com.google.dagger:dagger", "com.google.dagger:hilt-android"]),
    ("hilt", &["com.google.dagger:hilt-android", "com.google.dagger.hilt.android"]),
    ("koin", &["io.insert-koin:koin-android", "io.insert-koin:koin-core"]),
];

const COMPOSE_LIBRARIES: &[&str] = &[
    "androidx.compose.compiler",
    "androidx.compose.runtime",
    "androidx.compose.ui",
];

/// Kotlin sources sampled for `@Composable`
const COMPOSE_SAMPLE: usize = 10;

/// What the build scripts say about the project. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectProfile {
    /// `group:artifact` coordinates declared as dependencies
    pub libraries: BTreeSet<String>,
    /// Build plugins seen (android_plugin, kotlin_plugin)
    pub plugins: BTreeSet<String>,
    pub compose: bool,
    pub di_frameworks: BTreeSet<String>,
    /// Permissions requested by `app/src/main/AndroidManifest.xml`
    pub permissions: Vec<String>,
}

impl ProjectProfile {
    /// Build the profile from the walked file list
    pub fn scan(root: &Path, files: &[PathBuf]) -> Self {
        let dependency = Regex::new(
            r#"(implementation|api|compile|kapt|ksp)\s*\(?\s*['"]([^:'"]+:[^:'"]+)"#,
        )
        .expect("dependency pattern is a valid regex");

        let mut profile = Self::default();

        let build_scripts = files.iter().filter(|p| {
            p.file_name()
                .is_some_and(|n| n == "build.gradle" || n == "build.gradle.kts")
        });
        for script in build_scripts {
            let Ok(content) = fs::read_to_string(script) else {
                tracing::debug!("Cannot read build script {:?}", script);
                continue;
            };
            profile.add_build_script(&dependency, &content);
        }

        if COMPOSE_LIBRARIES
            .iter()
            .any(|lib| profile.libraries.iter().any(|l| l.starts_with(lib)))
        {
            profile.compose = true;
        }
        if !profile.compose {
            profile.compose = files
                .iter()
                .filter(|p| p.extension().is_some_and(|e| e == "kt"))
                .take(COMPOSE_SAMPLE)
                .any(|p| {
                    fs::read_to_string(p).is_ok_and(|content| content.contains("@Composable"))
                });
        }

        profile.permissions = read_permissions(&root.join("app/src/main/AndroidManifest.xml"));
        profile
    }

    fn add_build_script(&mut self, dependency: &Regex, content: &str) {
        for captures in dependency.captures_iter(content) {
            if let Some(coordinate) = captures.get(2) {
                self.libraries.insert(coordinate.as_str().to_string());
            }
        }

        if content.contains("com.android.application") || content.contains("com.android.library") {
            self.plugins.insert("android_plugin".to_string());
        }
        if content.contains("org.jetbrains.kotlin.android") {
            self.plugins.insert("kotlin_plugin".to_string());
        }

        for (framework, libraries) in DI_LIBRARIES {
            if libraries.iter().any(|lib| content.contains(lib)) {
                self.di_frameworks.insert(framework.to_string());
            }
        }
    }
}

fn read_permissions(manifest: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(manifest) else {
        return Vec::new();
    };
    let chunker = crate::chunker::XmlChunker::new(usize::MAX);
    match chunker.chunk(manifest, &content) {
        Ok(chunks) => chunks
            .into_iter()
            .filter(|c| c.chunk_type == crate::chunker::xml::MANIFEST_PERMISSIONS)
            .flat_map(|c| c.content.lines().map(str::to_string).collect::<Vec<_>>())
            .collect(),
        Err(e) => {
            tracing::debug!("Cannot parse manifest {:?}: {}", manifest, e);
            Vec::new()
        }
    }
}
