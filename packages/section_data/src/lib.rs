
mod coord;
mod loaded;
mod per_section;


pub use crate::{
    coord::{
        SECTION_EXTENT,
        SectionPos,
        sp,
    },
    loaded::{
        LoadedSections,
        Getter,
    },
    per_section::PerSection,
};
