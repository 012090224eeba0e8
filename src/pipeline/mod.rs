//! Pipeline stages for marker extraction.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render/cache ──▶ classify ──▶ extract ──▶ records
//! (path/URL)  (pdfium, PNG)   (yes/no)    (JSON)
//!                               │ no / error
//!                               └──────────────────▶ (none)
//! ```
//!
//! 1. [`input`]     validate the PDF (extension, size, magic) or download it
//! 2. [`render`]    [`render::PageRenderer`] trait and the pdfium backend
//! 3. [`cache`]     the rasterizer adapter: render once, reuse the PNG
//! 4. [`encode`]    image bytes → base64 `ImageData` for the vision request
//! 5. [`classify`]  the classifier adapter and its strict yes/no parser
//! 6. [`extract`]   the extractor adapter and its schema validation
//! 7. [`postprocess`]  clean-up of raw model answers before parsing
//! 8. [`page`]      classify → extract for one page, absorbing all failures

pub mod cache;
pub mod classify;
pub mod encode;
pub mod extract;
pub mod input;
pub mod page;
pub mod postprocess;
pub mod render;

#[cfg(test)]
pub(crate) mod testing;
