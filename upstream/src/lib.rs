mod curseforge;
mod modrinth;

pub use curseforge::CurseForgeAdapter;
pub use modrinth::ModrinthAdapter;
