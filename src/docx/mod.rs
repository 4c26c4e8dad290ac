//! WordprocessingML documents: a lossless event stream plus the paragraph, run and
//! table-cell model translation works on.

pub mod load;
pub mod model;
pub mod package;
pub mod save;
pub mod xml;
